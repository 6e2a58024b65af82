//! Configuration management for web-overlay
//!
//! - **document**: the JSON configuration document, read once at startup
//! - **source**: source descriptors and their lenient position/size parsing

pub mod document;
pub mod source;

pub use document::OverlayConfig;
pub use source::{Corner, PositionSpec, SourceDescriptor};
