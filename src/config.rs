//! Configuration
//!
//! Runtime configuration for the collaboration core. Values come from the
//! builder or from environment variables, with sensible defaults for local
//! development.
//!
//! ## Environment Variables
//!
//! - `COEDIT_SIGNALING_URL` - signaling endpoint address (default: `mem://local`)
//! - `COEDIT_WORKSPACE` - workspace scope for room ids (default: `default`)

use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_SIGNALING_URL: &str = "mem://local";
const DEFAULT_WORKSPACE: &str = "default";
const DEFAULT_RECONNECT_INITIAL: Duration = Duration::from_millis(250);
const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Configuration for a [`crate::CollabCore`] instance.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Workspace scope. Two files with the same key in different
    /// workspaces land in different rooms.
    pub workspace: String,
    /// Signaling endpoint address. Opaque to the core; handed to the
    /// transport as-is.
    pub signaling_url: String,
    /// First reconnect delay after a dropped connection.
    pub reconnect_initial_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::var("COEDIT_WORKSPACE")
                .unwrap_or_else(|_| DEFAULT_WORKSPACE.to_string()),
            signaling_url: std::env::var("COEDIT_SIGNALING_URL")
                .unwrap_or_else(|_| DEFAULT_SIGNALING_URL.to_string()),
            reconnect_initial_delay: DEFAULT_RECONNECT_INITIAL,
            reconnect_max_delay: DEFAULT_RECONNECT_MAX,
        }
    }
}

impl CollabConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CollabConfigBuilder {
        CollabConfigBuilder::default()
    }

    /// Validate the configuration. Called by [`crate::CollabCore::initialize`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace.is_empty() {
            return Err(ConfigError::MissingValue("workspace"));
        }
        if self.signaling_url.is_empty() {
            return Err(ConfigError::MissingValue("signaling_url"));
        }
        if self.reconnect_max_delay < self.reconnect_initial_delay {
            return Err(ConfigError::InvalidValue {
                field: "reconnect_max_delay",
                message: "must be >= reconnect_initial_delay".to_string(),
            });
        }
        Ok(())
    }

    /// Deterministic room id for a file key. Every replica that opens the
    /// same key in the same workspace rendezvouses in the same room.
    pub fn room_id(&self, file_key: &str) -> String {
        format!("{}/{}", self.workspace, file_key)
    }
}

/// Builder for [`CollabConfig`].
#[derive(Debug, Default)]
pub struct CollabConfigBuilder {
    workspace: Option<String>,
    signaling_url: Option<String>,
    reconnect_initial_delay: Option<Duration>,
    reconnect_max_delay: Option<Duration>,
}

impl CollabConfigBuilder {
    pub fn workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = Some(url.into());
        self
    }

    pub fn reconnect_initial_delay(mut self, delay: Duration) -> Self {
        self.reconnect_initial_delay = Some(delay);
        self
    }

    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = Some(delay);
        self
    }

    pub fn build(self) -> Result<CollabConfig, ConfigError> {
        let defaults = CollabConfig::default();
        let config = CollabConfig {
            workspace: self.workspace.unwrap_or(defaults.workspace),
            signaling_url: self.signaling_url.unwrap_or(defaults.signaling_url),
            reconnect_initial_delay: self
                .reconnect_initial_delay
                .unwrap_or(defaults.reconnect_initial_delay),
            reconnect_max_delay: self
                .reconnect_max_delay
                .unwrap_or(defaults.reconnect_max_delay),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CollabConfig::default().validate().is_ok());
    }

    #[test]
    fn test_room_id_is_deterministic_and_scoped() {
        let a = CollabConfig::builder().workspace("team-a").build().unwrap();
        let b = CollabConfig::builder().workspace("team-b").build().unwrap();

        assert_eq!(a.room_id("main.rs"), a.room_id("main.rs"));
        assert_ne!(a.room_id("main.rs"), a.room_id("lib.rs"));
        assert_ne!(a.room_id("main.rs"), b.room_id("main.rs"));
    }

    #[test]
    fn test_builder_rejects_inverted_delays() {
        let result = CollabConfigBuilder::default()
            .reconnect_initial_delay(Duration::from_secs(10))
            .reconnect_max_delay(Duration::from_secs(1))
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "reconnect_max_delay",
                ..
            })
        ));
    }

    #[test]
    fn test_builder_rejects_empty_workspace() {
        let result = CollabConfigBuilder::default().workspace("").build();
        assert!(matches!(result, Err(ConfigError::MissingValue("workspace"))));
    }
}
