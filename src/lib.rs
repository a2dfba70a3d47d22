//! # taginfo-stream Library
//!
//! Streams the exiftool tag catalog (`exiftool -listx`) to HTTP clients as a
//! JSON array, converting table by table so neither the XML listing nor the
//! JSON response is ever held in memory as a whole.

pub mod bridge;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod error;
pub mod logging;
pub mod projector;
pub mod scanner;
pub mod server;
pub mod transcoder;

pub use bridge::{LIST_XML_FLAG, ToolOutcome, ToolStream, launch};
pub use catalog::{Description, Table, Tag};
pub use cli::{Cli, VerbosityLevel};
pub use config::{ConfigManager, EnvProvider, ServerConfig, SystemEnvProvider};
pub use emitter::{JsonArrayEmitter, body_channel};
pub use error::{BridgeError, ConfigError, EmitError, ScanError, ServerError};
pub use projector::{OutputRecord, project_table, project_tag};
pub use scanner::{CatalogScanner, Termination};
pub use server::{AppState, router, serve, serve_with_shutdown};
pub use transcoder::{CatalogSummary, StreamOutcome, stream_catalog, transcode};
