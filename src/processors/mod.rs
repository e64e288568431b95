//! Clustering and result processing.

pub mod clustering;
pub mod engine;
pub mod summary;

// Re-export key types for convenience
pub use clustering::{
    cluster_distance, cluster_features, within_tolerance, Cluster, ClusterId, ClusterPass, IdIssuer,
};
pub use engine::{ClusterEngine, ClusterError};
pub use summary::{summarize, ClusterSummary};
