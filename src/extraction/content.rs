//! Message text extraction with inline link annotation.

use super::page::{ChatPage, NodeRef};
use serde::Deserialize;
use tracing::warn;

/// Rendered subtree of a message node, as reported by the page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentNode {
    Text {
        text: String,
    },
    Link {
        #[serde(default)]
        text: String,
        #[serde(default)]
        href: String,
    },
    Image {
        #[serde(default)]
        alt: Option<String>,
    },
    Element {
        #[serde(default)]
        tag: String,
        #[serde(default)]
        children: Vec<ContentNode>,
    },
}

impl ContentNode {
    pub fn text(text: impl Into<String>) -> Self {
        ContentNode::Text { text: text.into() }
    }

    pub fn link(text: impl Into<String>, href: impl Into<String>) -> Self {
        ContentNode::Link {
            text: text.into(),
            href: href.into(),
        }
    }

    pub fn element(tag: impl Into<String>, children: Vec<ContentNode>) -> Self {
        ContentNode::Element {
            tag: tag.into(),
            children,
        }
    }
}

/// Depth-first flatten: text is copied verbatim, links become
/// `<text> [<href>] `, images contribute nothing, everything else recurses.
pub fn flatten(node: &ContentNode) -> String {
    let mut out = String::new();
    flatten_into(node, &mut out);
    out
}

fn flatten_into(node: &ContentNode, out: &mut String) {
    match node {
        ContentNode::Text { text } => out.push_str(text),
        ContentNode::Link { text, href } => {
            out.push_str(text);
            out.push_str(" [");
            out.push_str(href);
            out.push_str("] ");
        }
        ContentNode::Image { .. } => {}
        ContentNode::Element { children, .. } => {
            for child in children {
                flatten_into(child, out);
            }
        }
    }
}

/// Extract the trimmed text of a message.
///
/// Degrades instead of failing: an unreadable subtree falls back to the
/// node's flattened `innerText`, and if that fails too the result is empty
/// (which the orchestrator treats as "nothing to emit").
pub async fn extract_content<P>(page: &P, node: NodeRef) -> String
where
    P: ChatPage + ?Sized,
{
    match page.read_content(node).await {
        Ok(tree) => flatten(&tree).trim().to_string(),
        Err(e) => {
            warn!("content extraction failed ({}); falling back to raw text", e);
            match page.read_text(node).await {
                Ok(text) => text.trim().to_string(),
                Err(e) => {
                    warn!("raw text fallback failed: {}", e);
                    String::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_annotated_inline() {
        let tree = ContentNode::element(
            "div",
            vec![
                ContentNode::text("check "),
                ContentNode::link("this", "https://example.com/a"),
                ContentNode::element("span", vec![ContentNode::text("out")]),
            ],
        );
        assert_eq!(flatten(&tree), "check this [https://example.com/a] out");
    }

    #[test]
    fn image_only_subtree_is_empty() {
        let tree = ContentNode::element(
            "div",
            vec![ContentNode::element(
                "span",
                vec![ContentNode::Image {
                    alt: Some("image".into()),
                }],
            )],
        );
        assert!(flatten(&tree).trim().is_empty());
    }

    #[test]
    fn deserializes_page_snapshot() {
        let raw = serde_json::json!({
            "kind": "element",
            "tag": "div",
            "children": [
                {"kind": "text", "text": "hi "},
                {"kind": "link", "text": "docs", "href": "https://docs.rs"},
                {"kind": "image"}
            ]
        });
        let tree: ContentNode = serde_json::from_value(raw).unwrap();
        assert_eq!(flatten(&tree).trim(), "hi docs [https://docs.rs]");
    }
}
