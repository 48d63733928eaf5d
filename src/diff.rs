//! Minimal Change Computation
//!
//! Turns two content snapshots into the smallest single replacement that
//! transforms one into the other, by trimming the common prefix and suffix
//! on char boundaries. Used by the editor bridge in both directions: view
//! edits become one atomic buffer transaction, and buffer events become one
//! targeted view replacement instead of a full set-content.

use std::ops::Range;

/// A single replacement turning one string into another.
///
/// `range` is expressed in char offsets of the old string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    /// The replaced range of the old content (chars)
    pub range: Range<usize>,
    /// The text inserted in its place
    pub insert: String,
}

impl TextChange {
    /// Number of chars removed from the old content.
    pub fn deleted_len(&self) -> usize {
        self.range.end - self.range.start
    }

    /// End position (chars) of the inserted text in the new content.
    pub fn new_end(&self) -> usize {
        self.range.start + self.insert.chars().count()
    }
}

/// Compute the minimal single-range change from `old` to `new`.
///
/// Returns `None` when the contents are already equal.
pub fn minimal_change(old: &str, new: &str) -> Option<TextChange> {
    if old == new {
        return None;
    }

    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let mut prefix = 0;
    while prefix < old_chars.len()
        && prefix < new_chars.len()
        && old_chars[prefix] == new_chars[prefix]
    {
        prefix += 1;
    }

    let mut suffix = 0;
    while suffix < old_chars.len() - prefix
        && suffix < new_chars.len() - prefix
        && old_chars[old_chars.len() - 1 - suffix] == new_chars[new_chars.len() - 1 - suffix]
    {
        suffix += 1;
    }

    Some(TextChange {
        range: prefix..old_chars.len() - suffix,
        insert: new_chars[prefix..new_chars.len() - suffix].iter().collect(),
    })
}

/// Apply a change to a content snapshot.
pub fn apply_change(content: &str, change: &TextChange) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len() + change.insert.len());
    out.extend(&chars[..change.range.start]);
    out.push_str(&change.insert);
    out.extend(&chars[change.range.end..]);
    out
}
