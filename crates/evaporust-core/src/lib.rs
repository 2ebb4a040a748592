//! Resumable, concurrency-bounded multipart uploads to S3-compatible stores.
//!
//! The engine splits a file into parts, uploads them concurrently with
//! bounded retry, and finalizes the object once every part succeeded. Every
//! request is signed through [`evaporust_auth`], which lets the signature be
//! computed by a remote authorization endpoint so the client never holds the
//! secret key.
//!
//! # Architecture
//!
//! ```text
//! UploadCoordinator (registry, aggregated stats)
//!        |
//!        v
//!   UploadSession (state machine, one per file)
//!        |
//!        v
//!   PartScheduler (bounded concurrency, pause gate, retry)
//!        |
//!        v
//!   ObjectStore (S3 multipart API, signed requests)
//! ```

pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file;
pub mod scheduler;
pub mod session;
pub mod stats;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::EvaporateConfig;
pub use coordinator::UploadCoordinator;
pub use error::{UploadError, UploadResult};
pub use file::{LocalFile, MemoryFile, UploadFile};
pub use session::{UploadSession, UploadStatus};
pub use stats::UploadStats;
pub use store::{ObjectStore, S3ObjectStore};
