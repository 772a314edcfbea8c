use crate::extraction::color::ColorName;
use crate::extraction::orchestrator::ScanTuning;
use crate::extraction::sender::{HeadingLookup, SenderPalette};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ExporterConfig: file-based config loader (threadscribe.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "THREADSCRIBE_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_OUTPUT_PATH: &str = "THREADSCRIBE_OUTPUT";
pub const ENV_ANALYSIS_URL: &str = "THREADSCRIBE_ANALYSIS_URL";
pub const ENV_SETTLE_MS: &str = "THREADSCRIBE_SETTLE_MS";
pub const ENV_USER_DATA_DIR: &str = "THREADSCRIBE_USER_DATA_DIR";

pub const DEFAULT_HOME_URL: &str = "https://www.facebook.com";
pub const DEFAULT_MESSAGES_URL: &str = "https://www.facebook.com/messages/t/";
pub const DEFAULT_LOGIN_MARKER: &str = "[aria-label='Facebook']";
pub const DEFAULT_CONTAINER_SELECTOR: &str = "div.x78zum5.xdt5ytf.x1iyjqo2";
pub const DEFAULT_MESSAGE_XPATH: &str =
    ".//div/div/div/div/div/div/div/div/div/div/div/div/div/div/div/div/div/span/div/div/div/span/div";
pub const DEFAULT_SENDER_XPATHS: &[&str] = &[
    "./ancestor::div[contains(@class, 'x1n2onr6')]/div[1]/div/div/h4/div/div/span/span/span",
    "./ancestor::div[contains(@class, 'x1n2onr6')]/div[1]/div/div[1]/div/div/h4/div/div/div/div[2]/span/span",
    ".//h4//span/span/span",
];

/// Page structure of the chat site being exported.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct SiteConfig {
    /// Landing page opened right after launch (cookies are scoped to it).
    pub home_url: Option<String>,
    /// Conversation list the user picks a chat from.
    pub messages_url: Option<String>,
    /// CSS selector that only exists once the user is logged in.
    pub login_marker_selector: Option<String>,
    /// CSS selector of the scrollable message list.
    pub container_selector: Option<String>,
    /// XPath (relative to the container) matching one node per message bubble.
    pub message_xpath: Option<String>,
    /// Ordered XPaths (relative to a bubble) for the sender heading in group chats.
    pub sender_xpaths: Option<Vec<String>>,
}

impl SiteConfig {
    pub fn resolve_home_url(&self) -> String {
        non_empty(self.home_url.as_deref()).unwrap_or_else(|| DEFAULT_HOME_URL.to_string())
    }

    pub fn resolve_messages_url(&self) -> String {
        non_empty(self.messages_url.as_deref())
            .unwrap_or_else(|| DEFAULT_MESSAGES_URL.to_string())
    }

    pub fn resolve_login_marker(&self) -> String {
        non_empty(self.login_marker_selector.as_deref())
            .unwrap_or_else(|| DEFAULT_LOGIN_MARKER.to_string())
    }

    pub fn resolve_container_selector(&self) -> String {
        non_empty(self.container_selector.as_deref())
            .unwrap_or_else(|| DEFAULT_CONTAINER_SELECTOR.to_string())
    }

    pub fn resolve_message_xpath(&self) -> String {
        non_empty(self.message_xpath.as_deref())
            .unwrap_or_else(|| DEFAULT_MESSAGE_XPATH.to_string())
    }

    /// Sender lookups in priority order. An explicitly empty list disables
    /// heading lookup entirely (every group message becomes unattributed
    /// unless it is self-colored).
    pub fn resolve_sender_lookups(&self) -> Vec<HeadingLookup> {
        match &self.sender_xpaths {
            Some(list) => list
                .iter()
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(HeadingLookup::new)
                .collect(),
            None => DEFAULT_SENDER_XPATHS
                .iter()
                .map(|x| HeadingLookup::new(*x))
                .collect(),
        }
    }
}

/// Timing and pacing of the scan loop.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScanConfig {
    /// Wait after each scroll-back before rescanning. Default: 2000 ms.
    pub settle_ms: Option<u64>,
    /// Wait before rescanning when no message is rendered. Default: 1000 ms.
    pub empty_scan_delay_ms: Option<u64>,
    /// Bounded wait for the message container. Default: 30 s.
    pub container_timeout_secs: Option<u64>,
    /// Bounded wait for a manual login. Default: 300 s.
    pub login_timeout_secs: Option<u64>,
    /// Bounded wait for the login marker after cookie injection. Default: 10 s.
    pub cookie_login_timeout_secs: Option<u64>,
    /// Emit a progress line every N messages. Default: 10.
    pub progress_every: Option<usize>,
    /// Window scroll distance used when page-up fails. Default: 1000 px.
    pub fallback_scroll_px: Option<i64>,
    /// Failures tolerated per message before it is skipped. Default: 3.
    pub max_message_attempts: Option<u32>,
}

impl ScanConfig {
    /// Settle interval: JSON field → `THREADSCRIBE_SETTLE_MS` env var → 2000 ms.
    pub fn resolve_settle(&self) -> Duration {
        if let Some(ms) = self.settle_ms {
            return Duration::from_millis(ms);
        }
        let ms = std::env::var(ENV_SETTLE_MS)
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(2000);
        Duration::from_millis(ms)
    }

    pub fn resolve_login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs.unwrap_or(300))
    }

    pub fn resolve_cookie_login_timeout(&self) -> Duration {
        Duration::from_secs(self.cookie_login_timeout_secs.unwrap_or(10))
    }

    pub fn resolve_tuning(&self) -> ScanTuning {
        let defaults = ScanTuning::default();
        ScanTuning {
            settle_interval: self.resolve_settle(),
            empty_scan_delay: self
                .empty_scan_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.empty_scan_delay),
            container_timeout: self
                .container_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.container_timeout),
            progress_every: self
                .progress_every
                .filter(|n| *n > 0)
                .unwrap_or(defaults.progress_every),
            fallback_scroll_px: self.fallback_scroll_px.unwrap_or(defaults.fallback_scroll_px),
            max_message_attempts: self
                .max_message_attempts
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_message_attempts),
            ..defaults
        }
    }
}

/// Which bubble colors mean "me" and "the other person".
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct PaletteConfig {
    pub self_color: Option<String>,
    pub other_color: Option<String>,
}

impl PaletteConfig {
    /// Unknown color names log a warning and keep the default bucket.
    pub fn resolve(&self) -> SenderPalette {
        let defaults = SenderPalette::default();
        SenderPalette {
            self_color: parse_color_name(self.self_color.as_deref(), "self_color")
                .unwrap_or(defaults.self_color),
            other_color: parse_color_name(self.other_color.as_deref(), "other_color")
                .unwrap_or(defaults.other_color),
        }
    }
}

fn parse_color_name(raw: Option<&str>, field: &str) -> Option<ColorName> {
    let raw = non_empty(raw)?;
    match raw.parse::<ColorName>() {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!("threadscribe.json palette.{}: {}; using default", field, e);
            None
        }
    }
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrowserConfig {
    pub chrome_executable: Option<String>,
    /// Persistent profile directory, so a manual login survives restarts.
    pub user_data_dir: Option<String>,
}

impl BrowserConfig {
    /// Executable: JSON field → `CHROME_EXECUTABLE` → auto-discovery (`None` here).
    pub fn resolve_chrome_executable(&self) -> Option<String> {
        if let Some(p) = non_empty(self.chrome_executable.as_deref()) {
            if Path::new(&p).exists() {
                return Some(p);
            }
            tracing::warn!("threadscribe.json browser.chrome_executable not found: {}", p);
        }
        chrome_executable_override()
    }

    pub fn resolve_user_data_dir(&self) -> Option<PathBuf> {
        non_empty(self.user_data_dir.as_deref())
            .or_else(|| std::env::var(ENV_USER_DATA_DIR).ok().filter(|v| !v.trim().is_empty()))
            .map(PathBuf::from)
    }
}

#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct AnalysisConfig {
    pub endpoint: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl AnalysisConfig {
    /// Endpoint: JSON field → `THREADSCRIBE_ANALYSIS_URL` → `None` (analysis disabled).
    pub fn resolve_endpoint(&self) -> Option<String> {
        non_empty(self.endpoint.as_deref()).or_else(|| {
            std::env::var(ENV_ANALYSIS_URL)
                .ok()
                .filter(|v| !v.trim().is_empty())
        })
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(120))
    }
}

/// Top-level config loaded from `threadscribe.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
#[serde(default)]
pub struct ExporterConfig {
    pub site: SiteConfig,
    pub scan: ScanConfig,
    pub palette: PaletteConfig,
    pub browser: BrowserConfig,
    pub analysis: AnalysisConfig,
    pub output_path: Option<String>,
}

impl ExporterConfig {
    /// Output path: JSON field → `THREADSCRIBE_OUTPUT` → `~/Downloads/conversation.txt`.
    pub fn resolve_output_path(&self) -> PathBuf {
        if let Some(p) = non_empty(self.output_path.as_deref()) {
            return PathBuf::from(p);
        }
        if let Some(p) = std::env::var(ENV_OUTPUT_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            return PathBuf::from(p);
        }
        dirs::download_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conversation.txt")
    }
}

/// Load `threadscribe.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `THREADSCRIBE_CONFIG` env var path
/// 2. `./threadscribe.json`
/// 3. `~/.threadscribe/config.json`
///
/// Missing file → `ExporterConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ExporterConfig::default()`.
pub fn load_config() -> ExporterConfig {
    let mut candidates = vec![PathBuf::from("threadscribe.json")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".threadscribe").join("config.json"));
    }
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        if let Some(cfg) = load_config_from(path) {
            return cfg;
        }
    }

    ExporterConfig::default()
}

/// Read one candidate file. `None` when the file does not exist; a parse
/// error still yields `Some(default)` so a broken file is not silently
/// shadowed by a lower-priority one.
pub fn load_config_from(path: &Path) -> Option<ExporterConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<ExporterConfig>(&contents) {
        Ok(cfg) => {
            tracing::info!("threadscribe.json loaded from {}", path.display());
            Some(cfg)
        }
        Err(e) => {
            tracing::warn!(
                "threadscribe.json parse error at {}: {}; using defaults",
                path.display(),
                e
            );
            Some(ExporterConfig::default())
        }
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Only returns a value when `CHROME_EXECUTABLE` is set to an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_messenger_layout() {
        let cfg = ExporterConfig::default();
        assert_eq!(cfg.site.resolve_messages_url(), DEFAULT_MESSAGES_URL);
        assert_eq!(cfg.site.resolve_sender_lookups().len(), 3);
        let palette = cfg.palette.resolve();
        assert_eq!(palette.self_color, ColorName::Azure);
        assert_eq!(palette.other_color, ColorName::White);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "site": {{ "sender_xpaths": [".//h5", "  "] }},
                "scan": {{ "settle_ms": 50, "progress_every": 0, "max_message_attempts": 5 }},
                "palette": {{ "self_color": "blue", "other_color": "not-a-color" }},
                "output_path": "/tmp/chat.txt"
            }}"#
        )
        .unwrap();

        let cfg = load_config_from(file.path()).expect("file exists");
        let lookups = cfg.site.resolve_sender_lookups();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].xpath(), ".//h5");

        let tuning = cfg.scan.resolve_tuning();
        assert_eq!(tuning.settle_interval, Duration::from_millis(50));
        assert_eq!(tuning.progress_every, 10);
        assert_eq!(tuning.max_message_attempts, 5);

        let palette = cfg.palette.resolve();
        assert_eq!(palette.self_color, ColorName::Blue);
        assert_eq!(palette.other_color, ColorName::White);

        assert_eq!(cfg.resolve_output_path(), PathBuf::from("/tmp/chat.txt"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cfg = load_config_from(file.path()).expect("file exists");
        assert!(cfg.output_path.is_none());
    }

    #[test]
    fn missing_file_is_none() {
        assert!(load_config_from(Path::new("/definitely/not/here.json")).is_none());
    }
}
