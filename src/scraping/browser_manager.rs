//! Browser lifecycle using `chromiumoxide`.
//!
//! * Finding a usable Chromium-family executable (cross-platform).
//! * Launching one visible browser with a single working tab.
//! * Tracking transport closure through the CDP handler task.
//! * Tearing the session down from any task via [`SharedSession`].
//!
//! The window is always headed: the user logs in and watches the export in
//! the same window the engine scrolls.

use crate::core::types::{send_command, send_event, CommandSender, EventSender, StatusEvent, UiCommand};
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/snap/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Session ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LaunchSettings {
    /// Explicit executable; auto-discovered when `None`.
    pub executable: Option<String>,
    /// Persistent profile so a manual login survives restarts.
    pub user_data_dir: Option<PathBuf>,
    pub home_url: String,
}

fn build_headed_config(exe: &str, user_data_dir: Option<&Path>) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .with_head()
        .chrome_executable(exe)
        .viewport(None)
        .window_size(1280, 900)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-infobars")
        .arg("--disable-notifications");

    if let Some(dir) = user_data_dir {
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("chromiumoxide handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl BrowserSession {
    /// Launch a visible browser and open the home page in its only tab.
    pub async fn launch(settings: &LaunchSettings) -> Result<Self> {
        let exe = match settings.executable.clone() {
            Some(exe) => exe,
            None => find_chrome_executable().ok_or_else(|| {
                anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE.")
            })?,
        };
        info!("🚀 launching browser ({})", exe);

        let config = build_headed_config(&exe, settings.user_data_dir.as_deref())?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = browser
            .new_page(settings.home_url.as_str())
            .await
            .map_err(|e| anyhow!("Failed to open {}: {}", settings.home_url, e))?;

        Ok(Self {
            browser,
            page,
            handler_task,
            closed,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// `true` once the CDP transport has gone away (window closed, crash).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        if self.is_closed() {
            return Err(anyhow!("browser session closed"));
        }
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("Navigation to {} failed: {}", url, e))?;
        Ok(())
    }

    pub async fn reload(&self) -> Result<()> {
        self.page
            .reload()
            .await
            .map_err(|e| anyhow!("Reload failed: {}", e))?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        info!("closing browser session");
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("Browser close error: {}", e));
        let _ = tokio::time::timeout(Duration::from_secs(5), self.browser.wait()).await;
        self.handler_task.abort();
        result
    }
}

// ── Shared handle & teardown ─────────────────────────────────────────────────

/// The one browser session, shared between the export worker and cleanup.
/// Page access holds the lock for one call; teardown takes the session out.
pub type SharedSession = Arc<Mutex<Option<BrowserSession>>>;

pub fn share(session: BrowserSession) -> SharedSession {
    Arc::new(Mutex::new(Some(session)))
}

/// Release the browser and restore the presentation's start control.
///
/// Safe to call more than once; the reset command is sent every time.
pub async fn teardown(shared: &SharedSession, events: &EventSender, commands: &CommandSender) {
    let session = shared.lock().await.take();
    if let Some(session) = session {
        match session.close().await {
            Ok(()) => info!("🛑 browser closed"),
            Err(e) => {
                send_event(events, StatusEvent::error(format!("Error closing browser: {}", e)));
            }
        }
    }
    send_command(commands, UiCommand::reset_export_button());
}
