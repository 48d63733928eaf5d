//! Shared helpers for integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::time::{Duration, Instant};

use coedit::{
    CollabConfig, CollabCore, EditOrigin, EditorView, Identity, SyncHub, TextChange,
};

/// Install the log subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Test configuration with reconnect delays short enough for test runs.
pub fn test_config() -> CollabConfig {
    CollabConfig::builder()
        .workspace("test")
        .signaling_url("mem://test")
        .reconnect_initial_delay(Duration::from_millis(10))
        .reconnect_max_delay(Duration::from_millis(50))
        .build()
        .expect("test config is valid")
}

pub fn identity(id: &str, name: &str) -> Identity {
    Identity {
        id: id.to_string(),
        display_name: name.to_string(),
    }
}

/// A core attached to a shared hub, modeling one replica of the workspace.
pub async fn replica(hub: &SyncHub) -> CollabCore {
    init_tracing();
    CollabCore::initialize_with_hub(test_config(), hub.clone())
        .await
        .expect("core initializes")
}

/// Poll `cond` until it holds or the timeout elapses. Background pumps run
/// during the sleeps; returns whether the condition was met.
pub async fn wait_until(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Async variant of [`wait_until`] for conditions that need `.await`.
pub async fn wait_until_async<F, Fut>(cond: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond().await
}

/// In-memory editor view that records how often merged (remote-origin)
/// mutations touched it. Used to prove echo suppression.
pub struct TestView {
    content: String,
    cursor: usize,
    pub remote_mutations: usize,
    pub focused: bool,
}

impl TestView {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            cursor: 0,
            remote_mutations: 0,
            focused: false,
        }
    }

    /// Simulate the user typing at a char position, bypassing the
    /// mutation counters.
    pub fn type_text(&mut self, pos: usize, text: &str) {
        let mut chars: Vec<char> = self.content.chars().collect();
        let tail: Vec<char> = chars.split_off(pos);
        self.content = chars.into_iter().chain(text.chars()).chain(tail).collect();
        self.cursor = pos + text.chars().count();
    }
}

impl EditorView for TestView {
    fn content(&self) -> String {
        self.content.clone()
    }

    fn apply_change(&mut self, change: &TextChange, origin: EditOrigin) {
        self.content = coedit::apply_change(&self.content, change);
        if origin == EditOrigin::Remote {
            self.remote_mutations += 1;
        }
    }

    fn set_content(&mut self, content: &str, origin: EditOrigin) {
        self.content = content.to_string();
        if origin == EditOrigin::Remote {
            self.remote_mutations += 1;
        }
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn set_cursor(&mut self, pos: usize) {
        self.cursor = pos;
    }

    fn focus(&mut self) {
        self.focused = true;
    }
}
