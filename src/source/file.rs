//! Local file source.

use crate::core::features::FeatureResponse;
use crate::core::loaders::load_features;

use super::{BoxFuture, FeatureQuery, FeatureSource, FeatureSourceError};

/// Reads features from the file named by the query location.
///
/// Coordinates are returned as stored; the spatial reference in the query is
/// recorded on the response but no reprojection happens.
#[derive(Debug, Default, Clone)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch_all_point_features<'a>(
        &'a self,
        query: &'a FeatureQuery,
    ) -> BoxFuture<'a, Result<FeatureResponse, FeatureSourceError>> {
        Box::pin(async move {
            let mut response = load_features(query.location.trim(), query.include_z)?;
            if response.spatial_reference.is_none() {
                response.spatial_reference = Some(query.spatial_reference);
            }
            Ok(response)
        })
    }
}
