//! Export run control loop.
//!
//! One run walks the rendered conversation from newest to oldest: it scans
//! the visible message nodes, writes every message it has not seen before,
//! then pages the list back to reveal older history. The loop owns all run
//! state ([`ExportRun`]); the outside world only sees [`StatusEvent`]s and a
//! [`RunHandle`] to stop it.

use super::content::extract_content;
use super::identity::{identify, MessageIdentity, ProcessedSet};
use super::page::{ChatPage, NodeRef};
use super::scroll::{scroll_back, PassReport, ScrollDecision, ScrollTracker, StallOutcome, SCROLLING_STATUS};
use super::sender::{resolve_sender, HeadingLookup, SenderPalette};
use super::sink::{format_message, TranscriptSink};
use crate::core::error::{ExportError, PageError};
use crate::core::types::{send_event, ChatMode, EventSender, StatusEvent, StatusLevel};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ─── Tuning ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ScanTuning {
    /// Wait after a scroll-back for older history to render.
    pub settle_interval: Duration,
    /// Wait before rescanning when nothing is rendered.
    pub empty_scan_delay: Duration,
    pub container_timeout: Duration,
    pub container_poll: Duration,
    /// Wait after a non-fatal listing failure.
    pub error_retry_delay: Duration,
    pub progress_every: usize,
    pub fallback_scroll_px: i64,
    pub max_message_attempts: u32,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            settle_interval: Duration::from_secs(2),
            empty_scan_delay: Duration::from_secs(1),
            container_timeout: Duration::from_secs(30),
            container_poll: Duration::from_millis(500),
            error_retry_delay: Duration::from_secs(1),
            progress_every: 10,
            fallback_scroll_px: 1000,
            max_message_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub mode: ChatMode,
    pub output: PathBuf,
    pub tuning: ScanTuning,
    pub palette: SenderPalette,
    pub sender_lookups: Vec<HeadingLookup>,
}

impl ExportOptions {
    pub fn new(mode: ChatMode, output: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            output: output.into(),
            tuning: ScanTuning::default(),
            palette: SenderPalette::default(),
            sender_lookups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub messages: usize,
    pub output: PathBuf,
    /// `false` when the run was cancelled before the conversation loaded.
    pub transcript_written: bool,
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Scanning,
    Scrolled,
    Finalizing,
    Stopping,
}

fn log_state(state: ExportState) {
    debug!("export_state={:?}", state);
}

/// Emit a status event and mirror it into the log at the same level.
fn emit(events: &EventSender, level: StatusLevel, message: impl Into<String>) {
    let message = message.into();
    match level {
        StatusLevel::Info => info!("{}", message),
        StatusLevel::Warning => warn!("{}", message),
        StatusLevel::Error => error!("{}", message),
    }
    send_event(events, StatusEvent::Status { message, level });
}

/// Sleep unless cancelled first. Returns `false` on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Per-run aggregate. Exactly one exists per active export.
struct ExportRun<'a> {
    opts: &'a ExportOptions,
    events: &'a EventSender,
    processed: ProcessedSet,
    scroll: ScrollTracker,
    sink: TranscriptSink,
    message_count: usize,
    attempts: HashMap<MessageIdentity, u32>,
    /// Failed identification attempts per listing position on this screen.
    unreadable: HashMap<usize, u32>,
    state: ExportState,
}

/// What happened to a single new message.
enum Handled {
    Written,
    Skipped,
}

impl<'a> ExportRun<'a> {
    fn set_state(&mut self, state: ExportState) {
        if self.state != state {
            self.state = state;
            log_state(state);
        }
    }

    async fn scan_pass<P>(
        &mut self,
        page: &P,
        visible: &[NodeRef],
        cancel: &CancellationToken,
    ) -> Result<PassReport, ExportError>
    where
        P: ChatPage + ?Sized,
    {
        let mut report = PassReport {
            total_visible: visible.len(),
            ..PassReport::default()
        };

        for &node in visible.iter().rev() {
            if cancel.is_cancelled() {
                break;
            }
            let Some(id) = identify(page, node).await else {
                if self.note_unreadable(node) {
                    report.processed_in_view += 1;
                }
                continue;
            };
            if self.processed.contains(&id) {
                report.processed_in_view += 1;
                continue;
            }

            match self.handle_message(page, node).await {
                Ok(handled) => {
                    if matches!(handled, Handled::Written) {
                        self.scroll.clear_status();
                    }
                    self.attempts.remove(&id);
                    self.processed.insert(id);
                    report.new_messages += 1;
                    report.processed_in_view += 1;
                }
                Err(ExportError::Page(e)) if !e.is_fatal() => self.record_failure(id, &e),
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn handle_message<P>(&mut self, page: &P, node: NodeRef) -> Result<Handled, ExportError>
    where
        P: ChatPage + ?Sized,
    {
        page.bring_into_view(node).await?;

        if page.has_image_marker(node).await? && page.read_text(node).await?.trim().is_empty() {
            debug!("skipping image-only message");
            return Ok(Handled::Skipped);
        }

        let sender = resolve_sender(
            page,
            node,
            self.opts.mode,
            &self.opts.palette,
            &self.opts.sender_lookups,
        )
        .await?;
        let content = extract_content(page, node).await;
        if content.is_empty() {
            return Ok(Handled::Skipped);
        }

        let line = format_message(self.opts.mode, &sender, &content);
        self.sink.append_line(&line)?;
        self.message_count += 1;
        emit(self.events, StatusLevel::Info, line);

        if self.message_count % self.opts.tuning.progress_every.max(1) == 0 {
            emit(
                self.events,
                StatusLevel::Info,
                format!("Processed {} messages...", self.message_count),
            );
        }
        Ok(Handled::Written)
    }

    fn record_failure(&mut self, id: MessageIdentity, err: &PageError) {
        emit(
            self.events,
            StatusLevel::Warning,
            format!("Error processing message: {}", err),
        );
        let attempts = self.attempts.entry(id.clone()).or_insert(0);
        *attempts += 1;
        if *attempts >= self.opts.tuning.max_message_attempts {
            warn!("giving up on message after {} attempts: {}", attempts, id);
            self.attempts.remove(&id);
            self.processed.insert(id);
        }
    }

    /// Count a listing slot whose node could not be identified. Returns
    /// `true` once the slot has used up its attempts, after which it no longer
    /// holds the scroll back. Slots are per screen and reset on every scroll.
    fn note_unreadable(&mut self, node: NodeRef) -> bool {
        let tries = self.unreadable.entry(node.index).or_insert(0);
        *tries += 1;
        if *tries == self.opts.tuning.max_message_attempts {
            warn!("message at position {} stayed unreadable; passing over it", node.index);
        }
        *tries >= self.opts.tuning.max_message_attempts
    }

    /// Write the end marker and the summary. Sink errors are reported but do
    /// not mask the run's own outcome.
    fn finalize(&mut self) {
        self.set_state(ExportState::Finalizing);
        match self.sink.close(self.message_count) {
            Ok(Some(marker)) => emit(self.events, StatusLevel::Info, marker),
            Ok(None) => {}
            Err(e) => emit(
                self.events,
                StatusLevel::Error,
                format!("Failed to finish transcript: {}", e),
            ),
        }
        emit(
            self.events,
            StatusLevel::Info,
            format!(
                "Export completed! Saved {} messages to {}",
                self.message_count,
                self.sink.path().display()
            ),
        );
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            messages: self.message_count,
            output: self.sink.path().to_path_buf(),
            transcript_written: true,
        }
    }
}

// ─── Run loop ────────────────────────────────────────────────────────────────

/// Poll for the message container until it appears, the timeout elapses or
/// the run is cancelled (`Ok(false)`).
async fn wait_for_container<P>(
    page: &P,
    tuning: &ScanTuning,
    cancel: &CancellationToken,
) -> Result<bool, ExportError>
where
    P: ChatPage + ?Sized,
{
    let started = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Ok(false);
        }
        match page.locate_container().await {
            Ok(true) => return Ok(true),
            Ok(false) | Err(PageError::ContainerMissing) => {}
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => debug!("container probe failed: {}", e),
        }
        if started.elapsed() >= tuning.container_timeout {
            return Err(ExportError::ContainerTimeout(tuning.container_timeout));
        }
        if !pause(cancel, tuning.container_poll).await {
            return Ok(false);
        }
    }
}

/// Run one export to completion. Always ends with [`StatusEvent::Complete`].
pub async fn run_export<P>(
    page: &P,
    opts: &ExportOptions,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<RunSummary, ExportError>
where
    P: ChatPage + ?Sized,
{
    let result = drive(page, opts, events, cancel).await;
    if let Err(e) = &result {
        error!("export failed: {}", e);
    }
    log_state(ExportState::Idle);
    send_event(events, StatusEvent::Complete);
    result
}

async fn drive<P>(
    page: &P,
    opts: &ExportOptions,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<RunSummary, ExportError>
where
    P: ChatPage + ?Sized,
{
    log_state(ExportState::Scanning);
    match wait_for_container(page, &opts.tuning, cancel).await {
        Ok(true) => {}
        Ok(false) => {
            info!("export cancelled before the conversation loaded");
            return Ok(RunSummary {
                messages: 0,
                output: opts.output.clone(),
                transcript_written: false,
            });
        }
        Err(e) => {
            emit(events, StatusLevel::Error, format!("Critical export error: {}", e));
            return Err(e);
        }
    }

    let sink = match TranscriptSink::open(&opts.output) {
        Ok(sink) => sink,
        Err(e) => {
            emit(
                events,
                StatusLevel::Error,
                format!("Cannot open {}: {}", opts.output.display(), e),
            );
            return Err(e.into());
        }
    };
    emit(events, StatusLevel::Info, sink.header());

    let mut run = ExportRun {
        opts,
        events,
        processed: ProcessedSet::default(),
        scroll: ScrollTracker::default(),
        sink,
        message_count: 0,
        attempts: HashMap::new(),
        unreadable: HashMap::new(),
        state: ExportState::Scanning,
    };

    let outcome = scan_loop(&mut run, page, cancel).await;
    if let Err(e) = &outcome {
        run.set_state(ExportState::Stopping);
        emit(events, StatusLevel::Error, format!("Critical export error: {}", e));
    }
    run.finalize();
    outcome.map(|()| run.summary())
}

async fn scan_loop<P>(
    run: &mut ExportRun<'_>,
    page: &P,
    cancel: &CancellationToken,
) -> Result<(), ExportError>
where
    P: ChatPage + ?Sized,
{
    let tuning = run.opts.tuning.clone();
    loop {
        if cancel.is_cancelled() {
            run.set_state(ExportState::Stopping);
            return Ok(());
        }
        run.set_state(ExportState::Scanning);

        let visible = match page.list_visible_messages().await {
            Ok(visible) => visible,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                emit(run.events, StatusLevel::Warning, format!("Error in main loop: {}", e));
                pause(cancel, tuning.error_retry_delay).await;
                continue;
            }
        };
        let Some(&first_visible) = visible.first() else {
            pause(cancel, tuning.empty_scan_delay).await;
            continue;
        };

        let report = run.scan_pass(page, &visible, cancel).await?;
        debug!(
            "pass: visible={} processed={} new={} total={}",
            report.total_visible, report.processed_in_view, report.new_messages, run.message_count
        );

        if cancel.is_cancelled() {
            continue;
        }
        if run.scroll.decide(&report) == ScrollDecision::Hold {
            if report.new_messages == 0 {
                pause(cancel, tuning.empty_scan_delay).await;
            }
            continue;
        }

        run.set_state(ExportState::Scrolled);
        if !scroll_back(page, first_visible, tuning.fallback_scroll_px).await? {
            pause(cancel, tuning.error_retry_delay).await;
            continue;
        }
        run.unreadable.clear();
        if run.scroll.record_status(SCROLLING_STATUS) {
            emit(run.events, StatusLevel::Info, SCROLLING_STATUS);
        }
        if !pause(cancel, tuning.settle_interval).await {
            continue;
        }
        match run.scroll.after_scroll(report.new_messages) {
            StallOutcome::Alert => {
                warn!("⚠️ no new messages after repeated scrolling");
                send_event(run.events, StatusEvent::StallAlert);
            }
            StallOutcome::Stalled { count } => debug!("stall count {}", count),
            StallOutcome::Progressing => {}
        }
    }
}

// ─── Exporter ────────────────────────────────────────────────────────────────

/// Guards the single-active-run invariant across spawned workers.
#[derive(Clone, Default)]
pub struct Exporter {
    active: Arc<AtomicBool>,
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Spawn a run on the tokio runtime. `None` when a run is already active.
    pub fn start<P>(&self, page: Arc<P>, opts: ExportOptions, events: EventSender) -> Option<RunHandle>
    where
        P: ChatPage + ?Sized + 'static,
    {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("export already running; start ignored");
            return None;
        }
        let guard = ActiveGuard(self.active.clone());
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        info!("🚀 export started ({} mode) → {}", opts.mode, opts.output.display());

        let join = tokio::spawn(async move {
            let _guard = guard;
            run_export(page.as_ref(), &opts, &events, &token).await
        });
        Some(RunHandle { cancel, join })
    }
}

pub struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary, ExportError>>,
}

impl RunHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end on its own.
    pub async fn wait(self) -> Option<Result<RunSummary, ExportError>> {
        match self.join.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!("export task failed: {}", e);
                None
            }
        }
    }

    /// Request a cooperative stop and wait up to `grace` for the worker to
    /// finish; abort it afterwards. `None` when the worker had to be aborted.
    pub async fn stop(mut self, grace: Duration) -> Option<Result<RunSummary, ExportError>> {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.join).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(e)) => {
                error!("export task failed: {}", e);
                None
            }
            Err(_) => {
                warn!("export did not stop within {:?}; aborting", grace);
                self.join.abort();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tuning_matches_documented_values() {
        let t = ScanTuning::default();
        assert_eq!(t.settle_interval, Duration::from_secs(2));
        assert_eq!(t.container_timeout, Duration::from_secs(30));
        assert_eq!(t.container_poll, Duration::from_millis(500));
        assert_eq!(t.progress_every, 10);
        assert_eq!(t.max_message_attempts, 3);
    }

    #[tokio::test]
    async fn pause_returns_false_when_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!pause(&cancel, Duration::from_secs(60)).await);
        assert!(pause(&CancellationToken::new(), Duration::from_millis(1)).await);
    }
}
