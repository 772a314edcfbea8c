//! Append-only transcript file.
//!
//! Every line is flushed as it is written so a crash or a killed browser
//! leaves a readable partial transcript on disk.

use crate::core::types::ChatMode;
use chrono::Local;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Format one message for the transcript.
///
/// Individual: `[sender] content`. Group: content, then `[sender]` on its own
/// line, or content alone when the sender is unknown.
pub fn format_message(mode: ChatMode, sender: &str, content: &str) -> String {
    match mode {
        ChatMode::Individual => format!("[{}] {}", sender, content),
        ChatMode::Group if sender.is_empty() => content.to_string(),
        ChatMode::Group => format!("{}\n[{}]", content, sender),
    }
}

pub struct TranscriptSink {
    path: PathBuf,
    header: String,
    file: Option<File>,
    lines_written: usize,
}

impl TranscriptSink {
    /// Create (or truncate) the transcript and write the session header.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(&path)?;
        let header = format!("=== Export Session Started: {} ===", timestamp());
        writeln!(file, "{}", header)?;
        file.flush()?;
        info!("📝 transcript opened at {}", path.display());
        Ok(Self {
            path,
            header,
            file: Some(file),
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The session-start marker line.
    pub fn header(&self) -> &str {
        &self.header
    }

    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn append_line(&mut self, line: &str) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "transcript already closed"))?;
        // Entry and terminator go out in a single write.
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        self.lines_written += 1;
        Ok(())
    }

    /// Write the end marker and message total, then release the file.
    /// Returns the end-marker line. Closing twice is a no-op.
    pub fn close(&mut self, total_messages: usize) -> io::Result<Option<String>> {
        let Some(mut file) = self.file.take() else {
            debug!("transcript {} already closed", self.path.display());
            return Ok(None);
        };
        let end_marker = format!("=== Export Session Ended: {} ===", timestamp());
        write!(
            file,
            "\n{}\n=== Total Messages: {} ===\n",
            end_marker, total_messages
        )?;
        file.flush()?;
        info!(
            "📝 transcript closed: {} messages in {}",
            total_messages,
            self.path.display()
        );
        Ok(Some(end_marker))
    }
}
