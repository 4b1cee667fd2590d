//! Batch processing of input lines into audio files.

mod downloader;
mod summary;

pub use downloader::{BatchOptions, Downloader};
pub use summary::BatchSummary;
