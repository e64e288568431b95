//! In-memory source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::core::features::{Feature, FeatureResponse};

use super::{BoxFuture, FeatureQuery, FeatureSource, FeatureSourceError};

#[derive(Debug, Clone)]
enum Behavior {
    Serve,
    Fail(String),
    Malformed,
}

/// Serves a replaceable feature list. Useful for embedding the engine behind
/// another data layer and for driving failure paths.
#[derive(Debug)]
pub struct MemorySource {
    features: RwLock<Vec<Feature>>,
    behavior: RwLock<Behavior>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features: RwLock::new(features),
            behavior: RwLock::new(Behavior::Serve),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Replace the served features.
    pub fn set_features(&self, features: Vec<Feature>) {
        if let Ok(mut guard) = self.features.write() {
            *guard = features;
        }
        self.set_behavior(Behavior::Serve);
    }

    /// Make subsequent fetches fail with `message`.
    pub fn fail_with(&self, message: impl Into<String>) {
        self.set_behavior(Behavior::Fail(message.into()));
    }

    /// Make subsequent fetches return a response without a feature list.
    pub fn respond_malformed(&self) {
        self.set_behavior(Behavior::Malformed);
    }

    /// Number of fetches served so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    fn set_behavior(&self, behavior: Behavior) {
        if let Ok(mut guard) = self.behavior.write() {
            *guard = behavior;
        }
    }

    fn respond(&self, include_z: bool) -> Result<FeatureResponse, FeatureSourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let behavior = self
            .behavior
            .read()
            .map_err(|_| FeatureSourceError::Unavailable("behavior lock poisoned".to_string()))?
            .clone();

        match behavior {
            Behavior::Fail(message) => Err(FeatureSourceError::Unavailable(message)),
            Behavior::Malformed => Ok(FeatureResponse::malformed()),
            Behavior::Serve => {
                let guard = self.features.read().map_err(|_| {
                    FeatureSourceError::Unavailable("feature lock poisoned".to_string())
                })?;
                let features = guard
                    .iter()
                    .cloned()
                    .map(|mut f| {
                        if !include_z {
                            f.geometry = f.geometry.flattened();
                        }
                        f
                    })
                    .collect();
                Ok(FeatureResponse::from_features(features))
            }
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FeatureSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_all_point_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureResponse, FeatureSourceError>> {
        Box::pin(async move {
            let mut response = self.respond(query.include_z)?;
            response.spatial_reference = Some(query.spatial_reference);
            Ok(response)
        })
    }
}
