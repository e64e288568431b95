//! The clustering engine: fetch, cluster, retain, answer queries.
//!
//! A [`ClusterEngine`] owns one id counter for its whole lifetime, the
//! cluster list of the latest successful pass and the largest cluster size
//! of that pass. A failed pass leaves all three untouched.
//!
//! `compute_clusters` takes `&mut self`, so two passes can never overlap on
//! one engine. Callers that share an engine between tasks put it behind a
//! lock; passes are then serialized and the last one to complete wins.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{EngineConfig, SpatialReference};
use crate::core::features::Point;
use crate::events::{ClusterEvent, EventEmitter, ListenerId};
use crate::source::{FeatureQuery, FeatureSource, FeatureSourceError};

use super::clustering::{cluster_features, locate, Cluster, ClusterId, IdIssuer};

/// Errors returned by [`ClusterEngine::compute_clusters`].
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The engine was built without a usable configuration and stays inert.
    #[error("engine configuration is invalid: {0}")]
    ConfigurationInvalid(String),

    /// The feature source could not be reached or reported an error.
    #[error("feature fetch failed: {0}")]
    FetchFailed(#[from] FeatureSourceError),

    /// The source answered without a usable feature list.
    #[error("malformed feature response: {0}")]
    MalformedResponse(String),
}

impl ClusterError {
    /// Fetch and response errors are transient; a later call may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClusterError::ConfigurationInvalid(_))
    }
}

#[derive(Debug, Clone)]
struct Settings {
    location: String,
    spatial_reference: SpatialReference,
    tolerance: f64,
    use_z: bool,
}

/// Greedy tolerance clustering over a feature source.
pub struct ClusterEngine {
    settings: Result<Settings, String>,
    source: Arc<dyn FeatureSource>,
    ids: IdIssuer,
    clusters: Arc<[Cluster]>,
    max_cluster_size: usize,
    passes: u64,
    events: EventEmitter,
}

impl ClusterEngine {
    /// Build an engine. An invalid configuration yields an inert engine whose
    /// queries return empty results; see [`ClusterEngine::try_new`] to fail
    /// early instead.
    pub fn new(config: &EngineConfig, source: Arc<dyn FeatureSource>) -> Self {
        let settings = config.validate().map(|()| Settings {
            location: config.source_location.clone().unwrap_or_default(),
            spatial_reference: config.spatial_reference.unwrap_or(SpatialReference::WGS84),
            tolerance: config.tolerance,
            use_z: config.use_z,
        });

        if let Err(reason) = &settings {
            log::warn!("cluster engine disabled: {}", reason);
        }

        Self {
            settings,
            source,
            ids: IdIssuer::new(),
            clusters: Arc::from(Vec::new()),
            max_cluster_size: 0,
            passes: 0,
            events: EventEmitter::new(),
        }
    }

    /// Build an engine, rejecting an invalid configuration.
    pub fn try_new(config: &EngineConfig, source: Arc<dyn FeatureSource>) -> Result<Self, ClusterError> {
        config.validate().map_err(ClusterError::ConfigurationInvalid)?;
        Ok(Self::new(config, source))
    }

    /// Whether the engine was configured validly.
    pub fn is_enabled(&self) -> bool {
        self.settings.is_ok()
    }

    /// Distance tolerance in effect, `None` for an inert engine.
    pub fn tolerance(&self) -> Option<f64> {
        self.settings.as_ref().ok().map(|s| s.tolerance)
    }

    /// Fetch every point feature and regroup them from scratch.
    ///
    /// On success the new clusters replace the retained ones and are
    /// returned. On failure the retained clusters and max size are kept.
    pub async fn compute_clusters(&mut self) -> Result<Arc<[Cluster]>, ClusterError> {
        let settings = self
            .settings
            .clone()
            .map_err(ClusterError::ConfigurationInvalid)?;

        match self.run_pass(&settings).await {
            Ok(clusters) => Ok(clusters),
            Err(err) => {
                log::warn!("clustering pass on {} failed: {}", settings.location, err);
                self.events.emit(&ClusterEvent::RefreshFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_pass(&mut self, settings: &Settings) -> Result<Arc<[Cluster]>, ClusterError> {
        let query = FeatureQuery {
            location: settings.location.clone(),
            spatial_reference: settings.spatial_reference,
            include_z: settings.use_z,
        };

        let response = self.source.fetch_all_point_features(&query).await?;
        let mut features = response.features.ok_or_else(|| {
            ClusterError::MalformedResponse(format!(
                "{} returned no feature list",
                self.source.name()
            ))
        })?;

        if !settings.use_z {
            for feature in features.iter_mut() {
                feature.geometry = feature.geometry.flattened();
            }
        }

        // Everything below runs without suspension.
        let pass = cluster_features(features, settings.tolerance, &mut self.ids);

        self.passes += 1;
        self.clusters = Arc::from(pass.clusters);
        self.max_cluster_size = pass.max_cluster_size;

        log::info!(
            "pass {}: {} features -> {} clusters (max size {}, next id {})",
            self.passes,
            pass.feature_count,
            self.clusters.len(),
            self.max_cluster_size,
            self.ids.peek()
        );

        self.events.emit(&ClusterEvent::ClustersRefreshed {
            pass: self.passes,
            cluster_count: self.clusters.len(),
            feature_count: pass.feature_count,
            max_cluster_size: self.max_cluster_size,
        });

        Ok(Arc::clone(&self.clusters))
    }

    /// Cluster with `id` from the latest successful pass.
    pub fn find_cluster_by_id(&self, id: ClusterId) -> Option<&Cluster> {
        // Ids within a pass are ascending.
        self.clusters
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|idx| &self.clusters[idx])
    }

    /// Largest member count of the latest successful pass; 0 before any.
    pub fn current_max_cluster_size(&self) -> usize {
        self.max_cluster_size
    }

    /// Clusters of the latest successful pass, in creation order.
    pub fn clusters(&self) -> Arc<[Cluster]> {
        Arc::clone(&self.clusters)
    }

    /// First cluster that would take a feature located at `point`.
    pub fn find_cluster_containing(&self, point: &Point) -> Option<&Cluster> {
        let tolerance = self.tolerance()?;
        let point = match &self.settings {
            Ok(s) if !s.use_z => point.flattened(),
            _ => *point,
        };
        locate(&self.clusters, &point, tolerance)
    }

    /// Look up a cluster and tell listeners it was selected.
    pub fn select_cluster(&self, id: ClusterId) -> Option<&Cluster> {
        let cluster = self.find_cluster_by_id(id)?;
        self.events.emit(&ClusterEvent::ClusterSelected {
            id,
            feature_count: cluster.len(),
        });
        Some(cluster)
    }

    /// Id the next newly created cluster will receive.
    pub fn next_cluster_id(&self) -> ClusterId {
        self.ids.peek()
    }

    /// Number of successful passes so far.
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&ClusterEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl std::fmt::Debug for ClusterEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterEngine")
            .field("enabled", &self.is_enabled())
            .field("source", &self.source.name())
            .field("clusters", &self.clusters.len())
            .field("max_cluster_size", &self.max_cluster_size)
            .field("next_id", &self.ids.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::Feature;
    use crate::source::MemorySource;
    use std::sync::Mutex;

    fn at(x: f64, y: f64) -> Feature {
        Feature::new(Point::new(x, y))
    }

    fn config() -> EngineConfig {
        EngineConfig::new("memory://surveys", SpatialReference::WGS84)
    }

    fn engine_with(features: Vec<Feature>) -> (ClusterEngine, Arc<MemorySource>) {
        let source = Arc::new(MemorySource::new(features));
        let engine = ClusterEngine::new(&config(), source.clone());
        (engine, source)
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let (mut engine, _) = engine_with(vec![at(0.0, 0.0), at(5.0, 0.0), at(50.0, 0.0)]);

        let clusters = engine.compute_clusters().await.unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, 0);
        assert_eq!(clusters[0].len(), 2);
        assert_eq!(clusters[1].id, 1);
        assert_eq!(clusters[1].geometry, Point::new(50.0, 0.0));
        assert_eq!(engine.current_max_cluster_size(), 2);
    }

    #[tokio::test]
    async fn test_queries_before_any_pass() {
        let (engine, _) = engine_with(vec![at(0.0, 0.0)]);
        assert!(engine.find_cluster_by_id(0).is_none());
        assert_eq!(engine.current_max_cluster_size(), 0);
        assert!(engine.clusters().is_empty());
        assert!(engine.find_cluster_containing(&Point::new(0.0, 0.0)).is_none());
    }

    #[tokio::test]
    async fn test_inert_engine_never_fetches() {
        let source = Arc::new(MemorySource::new(vec![at(0.0, 0.0)]));
        let mut engine = ClusterEngine::new(&EngineConfig::default(), source.clone());

        assert!(!engine.is_enabled());
        let err = engine.compute_clusters().await.unwrap_err();
        assert!(matches!(err, ClusterError::ConfigurationInvalid(_)));
        assert!(!err.is_retryable());
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(engine.current_max_cluster_size(), 0);
        assert!(engine.find_cluster_by_id(0).is_none());
    }

    #[test]
    fn test_try_new_rejects_missing_reference() {
        let mut cfg = config();
        cfg.spatial_reference = None;
        let result = ClusterEngine::try_new(&cfg, Arc::new(MemorySource::default()));
        assert!(matches!(result, Err(ClusterError::ConfigurationInvalid(_))));
    }

    #[tokio::test]
    async fn test_ids_grow_across_passes_and_old_ids_disappear() {
        let (mut engine, source) = engine_with(vec![at(0.0, 0.0), at(100.0, 0.0), at(200.0, 0.0)]);
        engine.compute_clusters().await.unwrap();
        assert_eq!(engine.next_cluster_id(), 3);

        source.set_features(vec![at(0.0, 0.0)]);
        let clusters = engine.compute_clusters().await.unwrap();

        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].id, 3);
        assert!(engine.find_cluster_by_id(0).is_none());
        assert!(engine.find_cluster_by_id(3).is_some());
        assert!(engine.find_cluster_by_id(4).is_none());
        assert_eq!(engine.pass_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_preserves_state() {
        let (mut engine, source) = engine_with(vec![at(0.0, 0.0), at(1.0, 0.0), at(40.0, 0.0)]);
        engine.compute_clusters().await.unwrap();

        source.fail_with("service unavailable");
        let err = engine.compute_clusters().await.unwrap_err();
        assert!(matches!(err, ClusterError::FetchFailed(_)));
        assert!(err.is_retryable());

        assert_eq!(engine.current_max_cluster_size(), 2);
        assert_eq!(engine.find_cluster_by_id(1).map(|c| c.len()), Some(1));
        assert_eq!(engine.next_cluster_id(), 2);
    }

    #[tokio::test]
    async fn test_malformed_response_preserves_state() {
        let (mut engine, source) = engine_with(vec![at(0.0, 0.0)]);
        engine.compute_clusters().await.unwrap();

        source.respond_malformed();
        let err = engine.compute_clusters().await.unwrap_err();
        assert!(matches!(err, ClusterError::MalformedResponse(_)));
        assert_eq!(engine.clusters().len(), 1);
        assert_eq!(engine.current_max_cluster_size(), 1);
    }

    #[tokio::test]
    async fn test_empty_feature_set_resets_max_size() {
        let (mut engine, source) = engine_with(vec![at(0.0, 0.0), at(1.0, 1.0)]);
        engine.compute_clusters().await.unwrap();
        assert_eq!(engine.current_max_cluster_size(), 2);

        source.set_features(Vec::new());
        let clusters = engine.compute_clusters().await.unwrap();
        assert!(clusters.is_empty());
        assert_eq!(engine.current_max_cluster_size(), 0);
    }

    #[tokio::test]
    async fn test_use_z_false_ignores_elevation() {
        let features = vec![
            Feature::new(Point::with_z(0.0, 0.0, 0.0)),
            Feature::new(Point::with_z(3.0, 0.0, 900.0)),
        ];
        let (mut engine, _) = engine_with(features.clone());
        let clusters = engine.compute_clusters().await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert!(!clusters[0].geometry.has_z());

        let source = Arc::new(MemorySource::new(features));
        let mut engine_3d = ClusterEngine::new(&config().with_use_z(true), source);
        let clusters = engine_3d.compute_clusters().await.unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[tokio::test]
    async fn test_events_one_per_pass() {
        let (mut engine, source) = engine_with(vec![at(0.0, 0.0)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        engine.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        engine.compute_clusters().await.unwrap();
        source.fail_with("down");
        let _ = engine.compute_clusters().await;
        engine.select_cluster(0);
        assert!(engine.select_cluster(99).is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0],
            ClusterEvent::ClustersRefreshed {
                pass: 1,
                cluster_count: 1,
                feature_count: 1,
                max_cluster_size: 1,
            }
        );
        assert!(matches!(seen[1], ClusterEvent::RefreshFailed { .. }));
        assert_eq!(seen[2], ClusterEvent::ClusterSelected { id: 0, feature_count: 1 });
    }

    #[tokio::test]
    async fn test_find_cluster_containing() {
        let (mut engine, _) = engine_with(vec![at(0.0, 0.0), at(50.0, 50.0)]);
        engine.compute_clusters().await.unwrap();

        assert_eq!(
            engine.find_cluster_containing(&Point::new(2.0, 2.0)).map(|c| c.id),
            Some(0)
        );
        // Elevation on the query point is ignored when the engine runs in 2D.
        assert_eq!(
            engine
                .find_cluster_containing(&Point::with_z(48.0, 50.0, 1000.0))
                .map(|c| c.id),
            Some(1)
        );
        assert!(engine.find_cluster_containing(&Point::new(25.0, 25.0)).is_none());
    }
}
