//! Configuration types for the clustering engine and its feature source.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid spatial reference: {0}")]
    InvalidSpatialReference(String),
}

/// Spatial reference identified by its well-known id.
///
/// The engine never interprets it; it is handed to the feature source so
/// coordinates come back in a single reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialReference {
    pub wkid: u32,
}

impl SpatialReference {
    pub const WGS84: SpatialReference = SpatialReference { wkid: 4326 };
    pub const WEB_MERCATOR: SpatialReference = SpatialReference { wkid: 102100 };

    #[inline]
    pub const fn new(wkid: u32) -> Self {
        Self { wkid }
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wkid:{}", self.wkid)
    }
}

fn spatial_reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?i)(?:epsg|wkid)?\s*:?\s*(\d+)$").expect("spatial reference pattern is valid")
    })
}

impl FromStr for SpatialReference {
    type Err = ConfigError;

    /// Accepts `4326`, `EPSG:4326` or `wkid:102100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        spatial_reference_pattern()
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .map(SpatialReference::new)
            .ok_or_else(|| ConfigError::InvalidSpatialReference(trimmed.to_string()))
    }
}

/// Engine configuration.
///
/// `source_location` and `spatial_reference` are required; without them the
/// engine is constructed inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Feature-service layer URL or local file path
    #[serde(default)]
    pub source_location: Option<String>,

    /// Reference system features are requested in
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,

    /// Maximum distance between a feature and a cluster nucleus
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Whether elevation takes part in distance computation
    #[serde(default)]
    pub use_z: bool,
}

fn default_tolerance() -> f64 {
    10.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            source_location: None,
            spatial_reference: None,
            tolerance: default_tolerance(),
            use_z: false,
        }
    }
}

impl EngineConfig {
    /// Convenience constructor with default tolerance and 2D distances.
    pub fn new(source_location: impl Into<String>, spatial_reference: SpatialReference) -> Self {
        Self {
            source_location: Some(source_location.into()),
            spatial_reference: Some(spatial_reference),
            ..Self::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_use_z(mut self, use_z: bool) -> Self {
        self.use_z = use_z;
        self
    }

    /// Checks the required options. Returns a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        match self.source_location.as_deref().map(str::trim) {
            None | Some("") => return Err("source location is missing".to_string()),
            Some(_) => {}
        }
        if self.spatial_reference.is_none() {
            return Err("spatial reference is missing".to_string());
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(format!("tolerance must be a non-negative number, got {}", self.tolerance));
        }
        Ok(())
    }
}

/// Configuration for the remote/local feature source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Attribute filter sent with every query
    #[serde(default = "default_where_clause")]
    pub where_clause: String,

    /// Records requested per page when the service limits transfer size
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_where_clause() -> String {
    "1=1".to_string()
}

fn default_page_size() -> usize {
    1000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            where_clause: default_where_clause(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Configuration for exported results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Attribute field counted per cluster in summaries
    #[serde(default)]
    pub breakdown_field: Option<String>,

    /// Write one row per feature in addition to the per-cluster table
    #[serde(default)]
    pub write_membership: bool,
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterPipelineConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl ClusterPipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ClusterPipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
