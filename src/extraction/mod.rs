//! Chat transcript extraction engine.

pub mod color;
pub mod content;
pub mod identity;
pub mod orchestrator;
pub mod page;
pub mod scroll;
pub mod sender;
pub mod sink;

pub use color::{classify, classify_css, ColorName, ColorSample};
pub use content::ContentNode;
pub use identity::MessageIdentity;
pub use orchestrator::{run_export, ExportOptions, Exporter, RunHandle, RunSummary, ScanTuning};
pub use page::{ChatPage, NodeAttributes, NodeRef};
pub use sender::{HeadingLookup, SenderPalette};
