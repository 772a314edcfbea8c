//! Sender attribution.
//!
//! Individual chats are attributed purely by bubble color. Group chats read
//! the participant name from the heading rendered above the bubble, but a
//! self-colored bubble is always "You" regardless of what the heading says.

use super::color::{self, ColorName, ColorSample};
use super::page::{ChatPage, NodeRef};
use crate::core::error::PageError;
use crate::core::types::ChatMode;
use tracing::debug;

pub const SELF_LABEL: &str = "You";
pub const OTHER_LABEL: &str = "Them";

/// Which color buckets mean "me" and "the other participant".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderPalette {
    pub self_color: ColorName,
    pub other_color: ColorName,
}

impl Default for SenderPalette {
    fn default() -> Self {
        Self {
            self_color: ColorName::Azure,
            other_color: ColorName::White,
        }
    }
}

/// Relative XPath locating a sender heading near a message node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingLookup {
    xpath: String,
}

impl HeadingLookup {
    pub fn new(xpath: impl Into<String>) -> Self {
        Self {
            xpath: xpath.into(),
        }
    }

    pub fn xpath(&self) -> &str {
        &self.xpath
    }
}

/// Individual mode: self color → "You", other color → "Them", anything else
/// is labelled with the bucket name itself.
pub fn resolve_individual(color: ColorName, palette: &SenderPalette) -> String {
    if color == palette.self_color {
        SELF_LABEL.to_string()
    } else if color == palette.other_color {
        OTHER_LABEL.to_string()
    } else {
        color.as_str().to_string()
    }
}

/// Group mode: a self-colored bubble is "You"; otherwise the heading text,
/// or empty when no heading was found.
pub fn resolve_group(heading: Option<&str>, color: ColorName, palette: &SenderPalette) -> String {
    if color == palette.self_color {
        return SELF_LABEL.to_string();
    }
    heading
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Try each lookup in order; first non-empty text wins. Lookup failures are
/// treated as "not found".
pub async fn find_heading<P>(page: &P, node: NodeRef, lookups: &[HeadingLookup]) -> Option<String>
where
    P: ChatPage + ?Sized,
{
    for lookup in lookups {
        match page.lookup_text(node, lookup.xpath()).await {
            Ok(Some(text)) if !text.trim().is_empty() => return Some(text.trim().to_string()),
            Ok(_) => {}
            Err(e) => debug!("sender lookup '{}' failed: {}", lookup.xpath(), e),
        }
    }
    None
}

/// Classify the effective bubble color of a message node.
pub async fn bubble_color<P>(page: &P, node: NodeRef) -> Result<ColorName, PageError>
where
    P: ChatPage + ?Sized,
{
    let css = page.read_computed_background(node).await?;
    Ok(color::classify(css.as_deref().and_then(ColorSample::parse)))
}

/// Attribute a message to a participant. Only the background read can fail;
/// heading lookups degrade to "unattributed".
pub async fn resolve_sender<P>(
    page: &P,
    node: NodeRef,
    mode: ChatMode,
    palette: &SenderPalette,
    lookups: &[HeadingLookup],
) -> Result<String, PageError>
where
    P: ChatPage + ?Sized,
{
    let color = bubble_color(page, node).await?;
    let sender = match mode {
        ChatMode::Individual => resolve_individual(color, palette),
        ChatMode::Group if color == palette.self_color => SELF_LABEL.to_string(),
        ChatMode::Group => {
            let heading = find_heading(page, node, lookups).await;
            resolve_group(heading.as_deref(), color, palette)
        }
    };
    debug!("sender resolved: {:?} -> {:?}", color, sender);
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_labels_follow_palette() {
        let p = SenderPalette::default();
        assert_eq!(resolve_individual(ColorName::Azure, &p), "You");
        assert_eq!(resolve_individual(ColorName::White, &p), "Them");
        assert_eq!(resolve_individual(ColorName::Purple, &p), "Purple");
    }

    #[test]
    fn custom_palette_changes_attribution() {
        let p = SenderPalette {
            self_color: ColorName::Purple,
            other_color: ColorName::LightGray,
        };
        assert_eq!(resolve_individual(ColorName::Purple, &p), "You");
        assert_eq!(resolve_individual(ColorName::Azure, &p), "Azure");
    }

    #[test]
    fn group_self_color_overrides_heading() {
        let p = SenderPalette::default();
        assert_eq!(resolve_group(Some("Alex"), ColorName::Azure, &p), "You");
        assert_eq!(resolve_group(Some(" Alex "), ColorName::White, &p), "Alex");
        assert_eq!(resolve_group(None, ColorName::White, &p), "");
        assert_eq!(resolve_group(Some("   "), ColorName::Gray, &p), "");
    }
}
