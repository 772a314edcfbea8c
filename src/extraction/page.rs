//! The narrow capability the extraction engine needs from a live chat page.
//!
//! Everything the orchestrator knows about the rendered conversation comes
//! through [`ChatPage`]. The production implementation drives Chromium over
//! CDP (`scraping::cdp_page`); tests drive the engine with synthetic nodes.

use crate::core::error::PageError;
use crate::extraction::content::ContentNode;
use async_trait::async_trait;

/// Opaque handle to one rendered message node.
///
/// Handles are only valid for the listing that produced them: the page bumps
/// `generation` on every [`ChatPage::list_visible_messages`] call and reports
/// [`PageError::Stale`] for handles from an older listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub generation: u64,
    pub index: usize,
}

impl NodeRef {
    pub const fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }
}

/// Raw attributes used to build a message identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize)]
pub struct NodeAttributes {
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub parent_class_name: String,
    #[serde(default)]
    pub text: String,
}

#[async_trait]
pub trait ChatPage: Send + Sync {
    /// `Ok(true)` once the scrollable message list exists.
    async fn locate_container(&self) -> Result<bool, PageError>;

    /// Currently rendered message nodes, in document order.
    async fn list_visible_messages(&self) -> Result<Vec<NodeRef>, PageError>;

    async fn read_attributes(&self, node: NodeRef) -> Result<NodeAttributes, PageError>;

    /// Effective background color: the node's own, or the nearest
    /// non-transparent ancestor's. `None` when everything up to the root is
    /// transparent.
    async fn read_computed_background(&self, node: NodeRef) -> Result<Option<String>, PageError>;

    /// Rendered subtree as text / link / image / element nodes.
    async fn read_content(&self, node: NodeRef) -> Result<ContentNode, PageError>;

    /// Flattened visible text (`innerText`).
    async fn read_text(&self, node: NodeRef) -> Result<String, PageError>;

    /// Whether the node renders an image attachment.
    async fn has_image_marker(&self, node: NodeRef) -> Result<bool, PageError>;

    /// Text of the first element matched by `xpath` evaluated relative to
    /// `node`; `None` when nothing matches.
    async fn lookup_text(&self, node: NodeRef, xpath: &str) -> Result<Option<String>, PageError>;

    async fn bring_into_view(&self, node: NodeRef) -> Result<(), PageError>;

    /// Scroll the node's scroll container back by one page.
    async fn page_up_from(&self, node: NodeRef) -> Result<(), PageError>;

    /// Scroll the window vertically by `dy` pixels (negative is up).
    async fn scroll_by(&self, dy: i64) -> Result<(), PageError>;
}
