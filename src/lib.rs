//! # partfetch
//!
//! `partfetch` downloads a resource over HTTP by splitting it into byte-range
//! segments fetched concurrently, then stitching the segments back together.
//! It supports:
//! - Multi-segment downloading when the server honours `Range` requests
//! - Resuming interrupted downloads from the segment files left on disk
//! - Cooperative stop with a guarantee that no worker is still writing
//! - Serialized progress notifications
//!
//! ## Example Usage
//!
//! ```no_run
//! use partfetch::{Download, NoopObserver, Options, Outcome};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), partfetch::DownloadError> {
//! let options = Options { threads: Some(4), ..Options::default() };
//! let download = Download::new("https://example.com/file.iso", options, Arc::new(NoopObserver)).await?;
//! assert_eq!(download.start().await?, Outcome::Completed);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod config;
pub mod download;
pub mod error;
pub mod latch;
pub mod merge;
pub mod observer;
pub mod planner;
pub mod probe;
pub mod worker;

pub use args::Args;
pub use config::{DownloadConfig, Options, Settings};
pub use download::{Download, Outcome, RunState};
pub use error::DownloadError;
pub use observer::{ConsoleObserver, NoopObserver, ProgressObserver};
pub use probe::ResourceDescriptor;
