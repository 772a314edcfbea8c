pub mod core;
pub mod extraction;
pub mod features;
pub mod scraping;

// --- Primary exports ---
pub use core::types;
pub use core::types::*;
pub use core::{load_config, ExportError, ExporterConfig, PageError};
pub use extraction::{run_export, ChatPage, ExportOptions, Exporter, RunHandle, RunSummary};
