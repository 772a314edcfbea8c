//! Scroll-back pacing and stall detection.

use super::page::{ChatPage, NodeRef};
use crate::core::error::PageError;
use tracing::{debug, warn};

pub const SCROLLING_STATUS: &str = "Scrolling to load more messages...";

/// Consecutive unproductive scroll passes that raise a stall alert.
pub const STALL_ALERT_THRESHOLD: u32 = 2;

/// Outcome of one scan pass over the visible messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub total_visible: usize,
    /// Visible messages accounted for: duplicates plus everything handled
    /// during this pass.
    pub processed_in_view: usize,
    /// New messages handled successfully during this pass.
    pub new_messages: usize,
}

impl PassReport {
    /// Everything on screen has been handled; time to load older history.
    pub fn needs_scroll(&self) -> bool {
        self.total_visible > 0 && self.processed_in_view >= self.total_visible
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDecision {
    Scroll,
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallOutcome {
    /// The pass found new messages; stall count was reset.
    Progressing,
    /// Unproductive pass below the alert threshold.
    Stalled { count: u32 },
    /// Threshold reached; the count has been reset to zero.
    Alert,
}

#[derive(Debug, Default)]
pub struct ScrollTracker {
    consecutive_stall_count: u32,
    last_emitted_status: Option<String>,
}

impl ScrollTracker {
    pub fn stall_count(&self) -> u32 {
        self.consecutive_stall_count
    }

    /// Decide whether to scroll after a pass. A productive pass resets the
    /// stall counter.
    pub fn decide(&mut self, report: &PassReport) -> ScrollDecision {
        if report.new_messages > 0 {
            self.consecutive_stall_count = 0;
        }
        if report.needs_scroll() {
            ScrollDecision::Scroll
        } else {
            ScrollDecision::Hold
        }
    }

    /// Account for a completed scroll + settle. `new_messages` is the count
    /// from the pass that triggered the scroll.
    pub fn after_scroll(&mut self, new_messages: usize) -> StallOutcome {
        if new_messages > 0 {
            self.consecutive_stall_count = 0;
            return StallOutcome::Progressing;
        }
        self.consecutive_stall_count += 1;
        if self.consecutive_stall_count >= STALL_ALERT_THRESHOLD {
            self.consecutive_stall_count = 0;
            StallOutcome::Alert
        } else {
            StallOutcome::Stalled {
                count: self.consecutive_stall_count,
            }
        }
    }

    /// Returns `true` when `status` differs from the last one recorded, so
    /// repeated "scrolling" lines are emitted once per streak.
    pub fn record_status(&mut self, status: &str) -> bool {
        if self.last_emitted_status.as_deref() == Some(status) {
            return false;
        }
        self.last_emitted_status = Some(status.to_string());
        true
    }

    pub fn clear_status(&mut self) {
        self.last_emitted_status = None;
    }
}

/// Scroll the message list back one page from its first visible node,
/// falling back to a fixed window scroll. `Ok(false)` when both fail in a
/// non-fatal way; such a pass is not counted toward a stall.
pub async fn scroll_back<P>(page: &P, first_visible: NodeRef, fallback_px: i64) -> Result<bool, PageError>
where
    P: ChatPage + ?Sized,
{
    match page.page_up_from(first_visible).await {
        Ok(()) => return Ok(true),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => debug!("page-up failed ({}); falling back to window scroll", e),
    }
    match page.scroll_by(-fallback_px.abs()).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("scroll-back failed: {}", e);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(total: usize, seen: usize, new: usize) -> PassReport {
        PassReport {
            total_visible: total,
            processed_in_view: seen,
            new_messages: new,
        }
    }

    #[test]
    fn scroll_only_when_everything_visible_is_processed() {
        let mut t = ScrollTracker::default();
        assert_eq!(t.decide(&report(5, 5, 0)), ScrollDecision::Scroll);
        assert_eq!(t.decide(&report(5, 3, 2)), ScrollDecision::Hold);
        assert_eq!(t.decide(&report(0, 0, 0)), ScrollDecision::Hold);
    }

    #[test]
    fn two_unproductive_scrolls_raise_one_alert() {
        let mut t = ScrollTracker::default();
        assert_eq!(t.after_scroll(0), StallOutcome::Stalled { count: 1 });
        assert_eq!(t.after_scroll(0), StallOutcome::Alert);
        assert_eq!(t.stall_count(), 0);
        assert_eq!(t.after_scroll(0), StallOutcome::Stalled { count: 1 });
    }

    #[test]
    fn new_messages_reset_the_stall_count() {
        let mut t = ScrollTracker::default();
        t.after_scroll(0);
        assert_eq!(t.after_scroll(3), StallOutcome::Progressing);
        assert_eq!(t.stall_count(), 0);

        t.after_scroll(0);
        t.decide(&report(4, 2, 2));
        assert_eq!(t.stall_count(), 0);
    }

    #[test]
    fn scrolling_status_is_deduplicated() {
        let mut t = ScrollTracker::default();
        assert!(t.record_status(SCROLLING_STATUS));
        assert!(!t.record_status(SCROLLING_STATUS));
        t.clear_status();
        assert!(t.record_status(SCROLLING_STATUS));
    }
}
