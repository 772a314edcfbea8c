//! [`ChatPage`] over a live Chromium tab.
//!
//! Message nodes never cross the CDP boundary as remote object ids. Each
//! listing stores the matched elements in a page-side registry
//! (`window.__threadscribe`) under a fresh generation number and hands out
//! `(generation, index)` handles; every later read resolves the handle inside
//! the page and answers `{stale: true}` when the listing was superseded or
//! the element left the document.

use super::browser_manager::SharedSession;
use crate::core::config::SiteConfig;
use crate::core::error::PageError;
use crate::extraction::content::ContentNode;
use crate::extraction::page::{ChatPage, NodeAttributes, NodeRef};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Where the conversation lives in the DOM.
#[derive(Debug, Clone)]
pub struct PageSelectors {
    pub container_selector: String,
    pub message_xpath: String,
}

impl PageSelectors {
    pub fn from_site(site: &SiteConfig) -> Self {
        Self {
            container_selector: site.resolve_container_selector(),
            message_xpath: site.resolve_message_xpath(),
        }
    }
}

pub struct CdpChatPage {
    session: SharedSession,
    selectors: PageSelectors,
}

#[derive(Debug, Deserialize)]
struct Listing {
    found: bool,
    #[serde(default)]
    generation: u64,
    #[serde(default)]
    count: usize,
}

#[derive(Debug, Deserialize)]
struct NodeReply<T> {
    #[serde(default)]
    stale: bool,
    value: Option<T>,
}

/// JSON-encode a Rust string as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

// ── Page scripts ─────────────────────────────────────────────────────────────

fn list_script(selectors: &PageSelectors) -> String {
    format!(
        r#"(() => {{
  const container = document.querySelector({sel});
  if (!container) return {{ found: false }};
  const snap = document.evaluate({xpath}, container, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  const nodes = [];
  for (let i = 0; i < snap.snapshotLength; i++) nodes.push(snap.snapshotItem(i));
  const reg = window.__threadscribe || {{ generation: 0, nodes: [] }};
  reg.generation += 1;
  reg.nodes = nodes;
  window.__threadscribe = reg;
  return {{ found: true, generation: reg.generation, count: nodes.length }};
}})()"#,
        sel = js_str(&selectors.container_selector),
        xpath = js_str(&selectors.message_xpath),
    )
}

/// Wrap `body` (which sees the resolved element as `el` and returns the
/// reply value) in the handle resolver.
fn node_script(node: NodeRef, body: &str) -> String {
    format!(
        r#"(() => {{
  const reg = window.__threadscribe;
  if (!reg || reg.generation !== {generation}) return {{ stale: true }};
  const el = reg.nodes[{index}];
  if (!el || !el.isConnected) return {{ stale: true }};
  const value = (() => {{ {body} }})();
  return {{ stale: false, value: value === undefined ? null : value }};
}})()"#,
        generation = node.generation,
        index = node.index,
        body = body,
    )
}

const ATTRIBUTES_BODY: &str = r#"
  const parent = el.parentElement;
  return {
    class_name: el.getAttribute('class') || '',
    parent_class_name: (parent && parent.getAttribute('class')) || '',
    text: el.innerText || '',
  };"#;

const BACKGROUND_BODY: &str = r#"
  let cur = el;
  while (cur && cur.nodeType === 1) {
    const bg = getComputedStyle(cur).backgroundColor;
    if (bg && bg !== 'transparent' && bg !== 'rgba(0, 0, 0, 0)') return bg;
    cur = cur.parentElement;
  }
  return null;"#;

const CONTENT_BODY: &str = r#"
  const snap = (n) => {
    if (n.nodeType === 3) return { kind: 'text', text: n.textContent || '' };
    if (n.nodeType !== 1) return { kind: 'element', tag: '', children: [] };
    const tag = n.tagName.toLowerCase();
    if (tag === 'a') return { kind: 'link', text: n.textContent || '', href: n.href || '' };
    if (tag === 'img') return { kind: 'image', alt: n.getAttribute('alt') };
    return { kind: 'element', tag, children: Array.from(n.childNodes).map(snap) };
  };
  return snap(el);"#;

const TEXT_BODY: &str = "return el.innerText || '';";

const IMAGE_MARKER_BODY: &str = r#"
  return el.querySelector('img') !== null && el.innerHTML.toLowerCase().includes('image');"#;

const INTO_VIEW_BODY: &str = "el.scrollIntoView({ block: 'center' }); return true;";

const PAGE_UP_BODY: &str = r#"
  let cur = el.parentElement;
  while (cur) {
    const s = getComputedStyle(cur);
    if ((s.overflowY === 'auto' || s.overflowY === 'scroll') && cur.scrollHeight > cur.clientHeight) break;
    cur = cur.parentElement;
  }
  if (!cur) return false;
  cur.scrollBy(0, -Math.max(cur.clientHeight * 0.9, 200));
  return true;"#;

fn lookup_body(xpath: &str) -> String {
    format!(
        r#"
  const hit = document.evaluate({xpath}, el, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
  if (!hit) return null;
  return (hit.innerText !== undefined ? hit.innerText : hit.textContent || '').trim();"#,
        xpath = js_str(xpath),
    )
}

/// Transport-level failures end the run; everything else is retryable.
fn map_cdp_error(err: chromiumoxide::error::CdpError) -> PageError {
    classify_cdp_message(&err.to_string())
}

fn classify_cdp_message(msg: &str) -> PageError {
    let lower = msg.to_ascii_lowercase();
    let lost = [
        "receiver is gone",
        "channel closed",
        "connection closed",
        "no target with given id",
        "target closed",
    ];
    if lost.iter().any(|m| lower.contains(m)) {
        PageError::SessionLost(msg.to_string())
    } else {
        PageError::Script(msg.to_string())
    }
}

// ── Implementation ───────────────────────────────────────────────────────────

impl CdpChatPage {
    pub fn new(session: SharedSession, selectors: PageSelectors) -> Self {
        Self { session, selectors }
    }

    /// Evaluate `script` while holding the session lock for this one call.
    async fn eval(&self, script: String) -> Result<Value, PageError> {
        let guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| PageError::SessionLost("browser session closed".to_string()))?;
        if session.is_closed() {
            return Err(PageError::SessionLost("browser window was closed".to_string()));
        }
        let result = session.page().evaluate(script).await.map_err(map_cdp_error)?;
        result
            .into_value::<Value>()
            .map_err(|e| PageError::Script(format!("unexpected script result: {}", e)))
    }

    async fn eval_node<T: DeserializeOwned>(&self, node: NodeRef, body: &str) -> Result<Option<T>, PageError> {
        let raw = self.eval(node_script(node, body)).await?;
        let reply: NodeReply<T> = serde_json::from_value(raw)
            .map_err(|e| PageError::Script(format!("malformed node reply: {}", e)))?;
        if reply.stale {
            return Err(PageError::Stale);
        }
        Ok(reply.value)
    }

    async fn eval_node_required<T: DeserializeOwned>(&self, node: NodeRef, body: &str) -> Result<T, PageError> {
        self.eval_node(node, body)
            .await?
            .ok_or_else(|| PageError::Script("empty node reply".to_string()))
    }
}

#[async_trait]
impl ChatPage for CdpChatPage {
    async fn locate_container(&self) -> Result<bool, PageError> {
        let script = format!(
            "document.querySelector({}) !== null",
            js_str(&self.selectors.container_selector)
        );
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    async fn list_visible_messages(&self) -> Result<Vec<NodeRef>, PageError> {
        let raw = self.eval(list_script(&self.selectors)).await?;
        let listing: Listing = serde_json::from_value(raw)
            .map_err(|e| PageError::Script(format!("malformed listing: {}", e)))?;
        if !listing.found {
            return Err(PageError::ContainerMissing);
        }
        debug!("listed {} messages (generation {})", listing.count, listing.generation);
        Ok((0..listing.count)
            .map(|i| NodeRef::new(listing.generation, i))
            .collect())
    }

    async fn read_attributes(&self, node: NodeRef) -> Result<NodeAttributes, PageError> {
        self.eval_node_required(node, ATTRIBUTES_BODY).await
    }

    async fn read_computed_background(&self, node: NodeRef) -> Result<Option<String>, PageError> {
        self.eval_node(node, BACKGROUND_BODY).await
    }

    async fn read_content(&self, node: NodeRef) -> Result<ContentNode, PageError> {
        self.eval_node_required(node, CONTENT_BODY).await
    }

    async fn read_text(&self, node: NodeRef) -> Result<String, PageError> {
        Ok(self.eval_node(node, TEXT_BODY).await?.unwrap_or_default())
    }

    async fn has_image_marker(&self, node: NodeRef) -> Result<bool, PageError> {
        Ok(self.eval_node(node, IMAGE_MARKER_BODY).await?.unwrap_or(false))
    }

    async fn lookup_text(&self, node: NodeRef, xpath: &str) -> Result<Option<String>, PageError> {
        self.eval_node(node, &lookup_body(xpath)).await
    }

    async fn bring_into_view(&self, node: NodeRef) -> Result<(), PageError> {
        self.eval_node::<bool>(node, INTO_VIEW_BODY).await.map(|_| ())
    }

    async fn page_up_from(&self, node: NodeRef) -> Result<(), PageError> {
        match self.eval_node::<bool>(node, PAGE_UP_BODY).await? {
            Some(true) => Ok(()),
            _ => Err(PageError::Script("no scrollable ancestor".to_string())),
        }
    }

    async fn scroll_by(&self, dy: i64) -> Result<(), PageError> {
        self.eval(format!("window.scrollBy(0, {}); true", dy)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_embedded_as_js_literals() {
        let selectors = PageSelectors {
            container_selector: "div[aria-label=\"Messages\"]".to_string(),
            message_xpath: ".//div[@role='row']".to_string(),
        };
        let script = list_script(&selectors);
        assert!(script.contains(r#"document.querySelector("div[aria-label=\"Messages\"]")"#));
        assert!(script.contains(r#"".//div[@role='row']""#));
    }

    #[test]
    fn node_script_checks_generation_and_index() {
        let script = node_script(NodeRef::new(7, 3), TEXT_BODY);
        assert!(script.contains("reg.generation !== 7"));
        assert!(script.contains("reg.nodes[3]"));
        assert!(script.contains(TEXT_BODY));
    }

    #[test]
    fn stale_reply_parses_without_value() {
        let reply: NodeReply<String> = serde_json::from_value(serde_json::json!({"stale": true})).unwrap();
        assert!(reply.stale);
        assert!(reply.value.is_none());

        let reply: NodeReply<Option<String>> =
            serde_json::from_value(serde_json::json!({"stale": false, "value": null})).unwrap();
        assert!(!reply.stale);
        assert!(reply.value.is_none());
    }

    #[test]
    fn transport_errors_are_fatal() {
        assert!(classify_cdp_message("send failed because receiver is gone").is_fatal());
        assert!(classify_cdp_message("Connection closed").is_fatal());
        assert!(!classify_cdp_message("TypeError: el.scrollBy is not a function").is_fatal());
    }

    #[tokio::test]
    async fn missing_session_reports_session_lost() {
        let shared: SharedSession = std::sync::Arc::new(tokio::sync::Mutex::new(None));
        let page = CdpChatPage::new(
            shared,
            PageSelectors {
                container_selector: "div".into(),
                message_xpath: ".//span".into(),
            },
        );
        let err = page.list_visible_messages().await.unwrap_err();
        assert!(matches!(err, PageError::SessionLost(_)));
    }
}
