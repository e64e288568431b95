//! Core data types and I/O operations.

pub mod features;
pub mod loaders;
pub mod writers;

pub use features::{AttributeValue, Attributes, Feature, FeatureResponse, Point};
pub use loaders::{load_features, FileFormat, LoaderError};
pub use writers::{write_clusters_csv, write_membership_csv, write_summary_json, WriteError};
