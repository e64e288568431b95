//! Feature source abstraction.
//!
//! The engine never talks to a service directly. It asks a [`FeatureSource`]
//! for every point feature at a location, expressed in a spatial reference,
//! with or without elevation. Implementations:
//! - [`FeatureServiceSource`]: remote feature-service layer over HTTP
//! - [`FileSource`]: local CSV / JSON / PLY files
//! - [`MemorySource`]: features held in memory

mod file;
mod http;
mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{SourceConfig, SpatialReference};
use crate::core::features::FeatureResponse;
use crate::core::loaders::LoaderError;

pub use file::FileSource;
pub use http::FeatureServiceSource;
pub use memory::MemorySource;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a feature source.
#[derive(Debug, Error)]
pub enum FeatureSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP error status {0}")]
    Status(u16),

    #[error("service error {code}: {message}")]
    Service { code: i64, message: String },

    #[error("failed to load features: {0}")]
    Load(#[from] LoaderError),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// What to fetch: every point feature at `location`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub location: String,
    pub spatial_reference: SpatialReference,
    pub include_z: bool,
}

/// Trait for point feature sources.
///
/// Implementations must be `Send + Sync` for use across async tasks.
/// Methods return boxed futures for dyn-compatibility.
pub trait FeatureSource: Send + Sync {
    /// Short description for logs.
    fn name(&self) -> &str;

    /// Fetch all records, all fields, geometry included.
    ///
    /// Returns `Err` when the source cannot be reached or reports an error.
    /// A response without a feature list is returned as `Ok` with
    /// `features: None`; deciding that it is malformed is the caller's job.
    fn fetch_all_point_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureResponse, FeatureSourceError>>;
}

/// Whether `location` addresses a remote service rather than a local file.
pub fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Pick the source implementation that can serve `location`.
pub fn source_for_location(
    location: &str,
    config: &SourceConfig,
) -> Result<Arc<dyn FeatureSource>, FeatureSourceError> {
    if is_remote(location) {
        Ok(Arc::new(FeatureServiceSource::new(config)?))
    } else {
        Ok(Arc::new(FileSource::new()))
    }
}
