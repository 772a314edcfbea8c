//! Compound message identity used for deduplication across re-scans.
//!
//! The key is a heuristic: class signature + parent class signature + the
//! first 50 characters of text. Distinct short messages with equal prefixes
//! and structure merge; re-renders that reorder classes split. Both are known
//! approximations.

use super::page::{ChatPage, NodeRef};
use std::collections::HashSet;
use tracing::debug;

pub const TEXT_PREFIX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageIdentity {
    key: String,
}

impl MessageIdentity {
    /// Build the key from raw attributes. The text prefix is counted in
    /// Unicode scalar values so emoji are never split.
    pub fn new(class_name: &str, parent_class_name: &str, text: &str) -> Self {
        let prefix: String = text.trim().chars().take(TEXT_PREFIX_CHARS).collect();
        Self {
            key: format!("{}|{}|{}", class_name, parent_class_name, prefix),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for MessageIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Derive the identity of a rendered node. `None` means the node could not be
/// read (stale or detached); the caller retries on the next pass.
pub async fn identify<P>(page: &P, node: NodeRef) -> Option<MessageIdentity>
where
    P: ChatPage + ?Sized,
{
    match page.read_attributes(node).await {
        Ok(attrs) => Some(MessageIdentity::new(
            &attrs.class_name,
            &attrs.parent_class_name,
            &attrs.text,
        )),
        Err(e) => {
            debug!("identify: cannot read node {:?}: {}", node, e);
            None
        }
    }
}

/// Identities seen during one export run. Grows monotonically.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    seen: HashSet<MessageIdentity>,
}

impl ProcessedSet {
    pub fn contains(&self, id: &MessageIdentity) -> bool {
        self.seen.contains(id)
    }

    /// Returns `true` when the identity was not seen before.
    pub fn insert(&mut self, id: MessageIdentity) -> bool {
        self.seen.insert(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
