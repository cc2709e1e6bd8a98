//! Outreach Core Library
//!
//! This crate provides the domain models, upload policy, configuration and tracing
//! setup shared by the Outreach media upload pipeline.

pub mod config;
pub mod constants;
pub mod models;
pub mod telemetry;
pub mod transport_types;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use models::{FileInfo, MediaFile, RemoteResult, UploadStatus};
pub use transport_types::TransportBackend;
pub use validation::{UploadPolicy, ValidationError};
