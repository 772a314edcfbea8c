pub mod browser_manager;
pub mod cdp_page;
pub mod login;

pub use browser_manager::{teardown, BrowserSession, LaunchSettings, SharedSession};
pub use cdp_page::{CdpChatPage, PageSelectors};
