pub mod config;
pub mod error;
pub mod types;

pub use config::{load_config, ExporterConfig};
pub use error::{ExportError, PageError};
