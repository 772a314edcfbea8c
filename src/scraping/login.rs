//! Getting the browser to a logged-in messages view.
//!
//! Two paths: wait for the user to log in by hand, or inject exported
//! cookies and verify. Any cookie problem degrades to the manual path with a
//! warning; it never aborts the session.

use super::browser_manager::SharedSession;
use crate::core::types::{send_event, EventSender, StatusEvent};
use crate::features::cookies::{self, CookieError};
use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const LOGIN_POLL: Duration = Duration::from_secs(2);
const COOKIE_VERIFY_POLL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub messages_url: String,
    /// CSS selector present only when logged in.
    pub login_marker: String,
    pub manual_timeout: Duration,
    pub cookie_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    Manual,
    Cookies,
}

async fn marker_present(shared: &SharedSession, marker: &str) -> Result<bool> {
    let guard = shared.lock().await;
    let session = guard
        .as_ref()
        .ok_or_else(|| anyhow!("browser session closed"))?;
    if session.is_closed() {
        return Err(anyhow!("browser window was closed"));
    }
    let script = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(marker)?
    );
    let found = session
        .page()
        .evaluate(script)
        .await
        .map_err(|e| anyhow!("login probe failed: {}", e))?
        .into_value::<bool>()
        .unwrap_or(false);
    Ok(found)
}

async fn navigate(shared: &SharedSession, url: &str) -> Result<()> {
    let guard = shared.lock().await;
    let session = guard
        .as_ref()
        .ok_or_else(|| anyhow!("browser session closed"))?;
    session.navigate(url).await
}

/// Poll for the login marker until it appears, `timeout` elapses or the
/// token is cancelled. Returns whether the marker was seen.
async fn wait_for_marker(
    shared: &SharedSession,
    marker: &str,
    timeout: Duration,
    poll: Duration,
    cancel: &CancellationToken,
) -> Result<bool> {
    let started = Instant::now();
    while started.elapsed() < timeout && !cancel.is_cancelled() {
        match marker_present(shared, marker).await {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(e) => {
                if shared.lock().await.is_none() {
                    return Err(e);
                }
                debug!("login probe: {}", e);
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(poll) => {}
        }
    }
    Ok(false)
}

/// Ask the user to log in, wait for it, then open the messages view.
///
/// The timeout is not an error: the messages page is opened regardless and
/// the export's own container wait decides whether the session is usable.
pub async fn manual_login(
    shared: &SharedSession,
    settings: &LoginSettings,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<()> {
    send_event(
        events,
        StatusEvent::info("Please log in to Facebook in the browser window..."),
    );
    let logged_in = wait_for_marker(
        shared,
        &settings.login_marker,
        settings.manual_timeout,
        LOGIN_POLL,
        cancel,
    )
    .await?;
    if logged_in {
        info!("✅ login detected");
    } else if !cancel.is_cancelled() {
        warn!("login not detected within {:?}", settings.manual_timeout);
    }
    if cancel.is_cancelled() {
        return Ok(());
    }
    navigate(shared, &settings.messages_url).await
}

async fn try_cookie_login(
    shared: &SharedSession,
    settings: &LoginSettings,
    cookie_json: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let parsed = cookies::parse_cookies(cookie_json).map_err(describe_cookie_error)?;
    {
        let guard = shared.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| anyhow!("browser session closed"))?;
        cookies::inject_into_page(session.page(), &parsed)
            .await
            .map_err(describe_cookie_error)?;
        session.reload().await?;
    }
    let verified = wait_for_marker(
        shared,
        &settings.login_marker,
        settings.cookie_timeout,
        COOKIE_VERIFY_POLL,
        cancel,
    )
    .await?;
    if !verified {
        return Err(anyhow!(
            "Cookie login error: login not confirmed within {}s",
            settings.cookie_timeout.as_secs()
        ));
    }
    Ok(())
}

fn describe_cookie_error(e: CookieError) -> anyhow::Error {
    match e {
        CookieError::InvalidJson(_) => anyhow!("{}", e),
        CookieError::Rejected(_) => anyhow!("Cookie login error: {}", e),
        other => anyhow!("Cookie validation error: {}", other),
    }
}

/// Log in with exported cookies, falling back to [`manual_login`] on any
/// failure. Returns the method that ended up being used.
pub async fn cookie_login(
    shared: &SharedSession,
    settings: &LoginSettings,
    cookie_json: &str,
    events: &EventSender,
    cancel: &CancellationToken,
) -> Result<LoginMethod> {
    match try_cookie_login(shared, settings, cookie_json, cancel).await {
        Ok(()) => {
            send_event(events, StatusEvent::info("Successfully logged in using cookies"));
            navigate(shared, &settings.messages_url).await?;
            Ok(LoginMethod::Cookies)
        }
        Err(e) => {
            if shared.lock().await.is_none() {
                return Err(e);
            }
            send_event(events, StatusEvent::warning(format!("{}. Using manual login.", e)));
            manual_login(shared, settings, events, cancel).await?;
            Ok(LoginMethod::Manual)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{event_channel, StatusLevel};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn settings() -> LoginSettings {
        LoginSettings {
            messages_url: "https://example.com/messages/".into(),
            login_marker: "[aria-label='Home']".into(),
            manual_timeout: Duration::from_millis(50),
            cookie_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn cookie_errors_read_like_user_messages() {
        let e = describe_cookie_error(CookieError::NotAnArray);
        assert_eq!(e.to_string(), "Cookie validation error: Cookies must be a JSON array");
        let e = describe_cookie_error(CookieError::Empty);
        assert_eq!(e.to_string(), "Cookie validation error: No cookies provided");
    }

    #[tokio::test]
    async fn closed_session_is_an_error_not_a_fallback() {
        let shared: SharedSession = Arc::new(Mutex::new(None));
        let (events, mut rx) = event_channel();
        let cancel = CancellationToken::new();

        let result = cookie_login(&shared, &settings(), "[]", &events, &cancel).await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn manual_login_without_session_fails_fast() {
        let shared: SharedSession = Arc::new(Mutex::new(None));
        let (events, mut rx) = event_channel();
        let cancel = CancellationToken::new();

        assert!(manual_login(&shared, &settings(), &events, &cancel).await.is_err());
        match rx.try_recv() {
            Ok(StatusEvent::Status { level, .. }) => assert_eq!(level, StatusLevel::Info),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
