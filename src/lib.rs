//! Greedy tolerance clustering of point features.
//!
//! This crate provides:
//! - A [`ClusterEngine`] that fetches point features from a [`FeatureSource`]
//!   and groups them around fixed nuclei, first fit in creation order
//! - Feature sources for feature-service layers (HTTP), local files and memory
//! - Per-cluster summaries and CSV/JSON export of the results
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feature_cluster::{ClusterEngine, EngineConfig, SpatialReference};
//! use feature_cluster::source::FileSource;
//!
//! # async fn run() -> Result<(), feature_cluster::ClusterError> {
//! let config = EngineConfig::new("surveys.csv", SpatialReference::WGS84).with_tolerance(25.0);
//! let mut engine = ClusterEngine::new(&config, Arc::new(FileSource::new()));
//! let clusters = engine.compute_clusters().await?;
//! println!("{} clusters, largest {}", clusters.len(), engine.current_max_cluster_size());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod events;
pub mod processors;
pub mod source;

pub use config::{ClusterPipelineConfig, EngineConfig, OutputConfig, SourceConfig, SpatialReference};
pub use crate::core::features::{AttributeValue, Feature, Point};
pub use events::{ClusterEvent, EventEmitter};
pub use processors::{Cluster, ClusterEngine, ClusterError, ClusterId};
pub use source::{FeatureQuery, FeatureSource, FeatureSourceError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
