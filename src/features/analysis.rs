//! Remote transcript analysis client.
//!
//! Posts the finished transcript to an HTTP analysis service and turns its
//! answer into display text. The service contract is small:
//! `POST {"chat_content": "..."}` → `200 {"analysis": "..."}` or
//! `4xx/5xx {"error": "..."}`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const UNKNOWN_ERROR: &str = "Unknown error occurred";
pub const CONNECT_ERROR: &str =
    "Could not connect to analysis server. Please make sure the server is running.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Chat export file not found: {}", .0.display())]
    TranscriptMissing(PathBuf),

    #[error("cannot read transcript: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid analysis endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    Analysis(String),
    Failed(String),
}

impl AnalysisOutcome {
    /// Text shown to the user.
    pub fn display_text(&self) -> String {
        match self {
            AnalysisOutcome::Analysis(text) => format!("{}\n\nAnalysis complete!", text),
            AnalysisOutcome::Failed(msg) if msg == CONNECT_ERROR => format!("Error: {}", msg),
            AnalysisOutcome::Failed(msg) => format!("Error during analysis: {}", msg),
        }
    }
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    chat_content: &'a str,
}

#[derive(Deserialize, Default)]
struct AnalysisResponse {
    analysis: Option<String>,
    error: Option<String>,
}

pub fn build_client(timeout: Duration) -> Result<reqwest::Client, AnalysisError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()?)
}

/// Send the transcript at `path` to `endpoint`.
///
/// Local problems (missing file, bad URL) are errors; everything the server
/// or the network does wrong becomes [`AnalysisOutcome::Failed`].
pub async fn analyze_transcript(
    client: &reqwest::Client,
    endpoint: &str,
    path: &Path,
) -> Result<AnalysisOutcome, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::TranscriptMissing(path.to_path_buf()));
    }
    let url = url::Url::parse(endpoint)
        .map_err(|_| AnalysisError::InvalidEndpoint(endpoint.to_string()))?;
    let chat_content = tokio::fs::read_to_string(path).await?;
    info!("🔎 sending {} bytes for analysis to {}", chat_content.len(), url);

    let response = match client
        .post(url)
        .json(&AnalysisRequest {
            chat_content: &chat_content,
        })
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) if e.is_connect() => {
            warn!("analysis server unreachable: {}", e);
            return Ok(AnalysisOutcome::Failed(CONNECT_ERROR.to_string()));
        }
        Err(e) => return Ok(AnalysisOutcome::Failed(e.to_string())),
    };

    let status = response.status();
    let body: AnalysisResponse = response.json().await.unwrap_or_default();
    if status == reqwest::StatusCode::OK {
        match body.analysis {
            Some(text) => Ok(AnalysisOutcome::Analysis(text)),
            None => Ok(AnalysisOutcome::Failed(
                "response did not contain an analysis".to_string(),
            )),
        }
    } else {
        warn!("analysis failed with HTTP {}", status);
        Ok(AnalysisOutcome::Failed(
            body.error.unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_text_matches_outcome() {
        assert_eq!(
            AnalysisOutcome::Analysis("Friendly chat.".into()).display_text(),
            "Friendly chat.\n\nAnalysis complete!"
        );
        assert_eq!(
            AnalysisOutcome::Failed("quota".into()).display_text(),
            "Error during analysis: quota"
        );
        assert!(AnalysisOutcome::Failed(CONNECT_ERROR.into())
            .display_text()
            .starts_with("Error: Could not connect"));
    }

    #[tokio::test]
    async fn missing_transcript_is_an_error() {
        let client = build_client(Duration::from_secs(1)).unwrap();
        let err = analyze_transcript(&client, "http://127.0.0.1:9/analyze", Path::new("/nonexistent/t.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::TranscriptMissing(_)));
    }
}
