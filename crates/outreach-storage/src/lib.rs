//! Outreach Storage Library
//!
//! This crate provides the upload transport abstraction and its implementations.
//! A transport sends exactly one file to remote object storage, reports progress and
//! honors cancellation; it never retries and never touches queue state.
//!
//! # Public id format
//!
//! Every backend identifies stored objects by a public id of the form
//! `{folder}/{uuid}` (or just `{uuid}` without a folder). Public ids must not contain
//! `..` or a leading `/`. Generation lives in the `keys` module so all backends agree.

pub mod factory;
pub(crate) mod keys;
#[cfg(feature = "transport-http")]
pub mod http;
#[cfg(feature = "transport-local")]
pub mod local;
pub mod progress;
pub mod traits;

// Re-export commonly used types
pub use factory::create_transport;
#[cfg(feature = "transport-http")]
pub use http::HttpTransport;
#[cfg(feature = "transport-local")]
pub use local::LocalTransport;
pub use outreach_core::TransportBackend;
pub use progress::ProgressReporter;
pub use tokio_util::sync::CancellationToken;
pub use traits::{TransportError, TransportResult, UploadTransport};
