use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::extraction::ChatPage`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("element is stale or detached from the document")]
    Stale,

    #[error("message container not found")]
    ContainerMissing,

    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("page script failed: {0}")]
    Script(String),
}

impl PageError {
    /// Fatal errors end the current run; everything else is retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PageError::ContainerMissing | PageError::SessionLost(_))
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("message container did not appear within {}s", .0.as_secs())]
    ContainerTimeout(Duration),

    #[error("transcript I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Page(#[from] PageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_session_level_errors_are_fatal() {
        assert!(PageError::ContainerMissing.is_fatal());
        assert!(PageError::SessionLost("receiver is gone".into()).is_fatal());
        assert!(!PageError::Stale.is_fatal());
        assert!(!PageError::Script("TypeError".into()).is_fatal());
    }

    #[test]
    fn container_timeout_message_mentions_seconds() {
        let e = ExportError::ContainerTimeout(Duration::from_secs(30));
        assert_eq!(e.to_string(), "message container did not appear within 30s");
    }
}
