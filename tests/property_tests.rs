//! Property-based tests for the diff, backoff, and replication invariants.

use std::time::Duration;

use coedit::{apply_change, minimal_change, BridgeId, ReconnectBackoff, SharedBuffer};
use proptest::prelude::*;

/// One random edit against a document of length `len`.
#[derive(Debug, Clone)]
enum RandomOp {
    Insert { at: usize, text: String },
    Delete { at: usize, count: usize },
}

fn random_ops() -> impl Strategy<Value = Vec<(usize, usize, String, bool)>> {
    proptest::collection::vec(
        (0usize..100, 1usize..4, "[a-z]{0,6}", proptest::bool::ANY),
        0..24,
    )
}

fn apply_random_ops(buffer: &SharedBuffer, ops: &[(usize, usize, String, bool)], id: BridgeId) {
    for (at, count, text, delete) in ops {
        let len = buffer.len_chars();
        let op = if *delete && len > 0 {
            let at = at % len;
            let end = (at + count).min(len);
            RandomOp::Delete { at, count: end - at }
        } else {
            RandomOp::Insert {
                at: at % (len + 1),
                text: text.clone(),
            }
        };
        match op {
            RandomOp::Insert { at, text } => {
                buffer.apply_local_change(at..at, &text, id).unwrap();
            }
            RandomOp::Delete { at, count } => {
                buffer.apply_local_change(at..at + count, "", id).unwrap();
            }
        }
    }
}

proptest! {
    /// `minimal_change` followed by `apply_change` reconstructs the target
    /// for arbitrary (including multibyte) strings.
    #[test]
    fn prop_minimal_change_roundtrip(old in "\\PC{0,40}", new in "\\PC{0,40}") {
        match minimal_change(&old, &new) {
            Some(change) => {
                prop_assert_eq!(apply_change(&old, &change), new);
            }
            None => prop_assert_eq!(old, new),
        }
    }

    /// The change never extends past the untouched prefix and suffix.
    #[test]
    fn prop_minimal_change_is_bounded(old in "[a-c]{0,20}", new in "[a-c]{0,20}") {
        if let Some(change) = minimal_change(&old, &new) {
            let old_len = old.chars().count();
            let new_len = new.chars().count();
            prop_assert!(change.range.end <= old_len);
            prop_assert!(change.range.start <= change.range.end);
            // Replacement accounts exactly for the length difference.
            prop_assert_eq!(
                old_len - change.deleted_len() + change.insert.chars().count(),
                new_len
            );
        }
    }

    /// Raw backoff delays never decrease and never exceed the cap.
    #[test]
    fn prop_backoff_is_monotone_and_capped(
        initial_ms in 1u64..500,
        max_ms in 500u64..5_000,
        steps in 1usize..40,
    ) {
        let initial = Duration::from_millis(initial_ms);
        let max = Duration::from_millis(max_ms);
        let mut backoff = ReconnectBackoff::new(initial, max);
        let mut previous = Duration::ZERO;
        for _ in 0..steps {
            let raw = backoff.peek_delay();
            prop_assert!(raw >= previous);
            prop_assert!(raw <= max);
            prop_assert!(raw >= initial.min(max));
            previous = raw;
            backoff.next_delay();
        }
    }

    /// Two replicas applying arbitrary independent edit streams converge
    /// once they exchange updates, regardless of exchange direction.
    #[test]
    fn prop_replicas_converge(
        ops_a in random_ops(),
        ops_b in random_ops(),
    ) {
        let a = SharedBuffer::new();
        let b = SharedBuffer::new();
        apply_random_ops(&a, &ops_a, BridgeId::new());
        apply_random_ops(&b, &ops_b, BridgeId::new());

        if let Some(update) = a.updates_since(&b.version()) {
            b.apply_remote(&update).unwrap();
        }
        if let Some(update) = b.updates_since(&a.version()) {
            a.apply_remote(&update).unwrap();
        }
        // One more exchange settles the case where both sides had news.
        if let Some(update) = a.updates_since(&b.version()) {
            b.apply_remote(&update).unwrap();
        }

        prop_assert_eq!(a.content(), b.content());
    }

    /// Re-importing any prefix of already-seen history changes nothing.
    #[test]
    fn prop_duplicate_imports_are_idempotent(ops in random_ops()) {
        let source = SharedBuffer::new();
        apply_random_ops(&source, &ops, BridgeId::new());

        let target = SharedBuffer::new();
        let snapshot = source.snapshot().unwrap();
        target.apply_remote(&snapshot).unwrap();
        let settled = target.content();

        prop_assert!(!target.apply_remote(&snapshot).unwrap());
        prop_assert_eq!(target.content(), settled);
    }
}
