//! Per-cluster statistics for the presentation layer.
//!
//! The view layer sizes cluster symbols relative to the largest cluster and
//! charts the answers recorded in one attribute field. Both numbers are
//! computed here; drawing them is not.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use crate::core::features::AttributeValue;

use super::clustering::{Cluster, ClusterId};

/// Key used for features whose breakdown field is missing or null.
pub const NULL_KEY: &str = "<null>";

/// Summary of one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    pub feature_count: usize,
    /// `feature_count / max_cluster_size`, in `(0, 1]`; 0 when the max is 0.
    pub relative_size: f64,
    /// Value counts of the breakdown field, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BTreeMap<String, usize>>,
}

/// Count the values of `field` across a cluster's members.
pub fn attribute_breakdown(cluster: &Cluster, field: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for feature in &cluster.features {
        let key = match feature.attribute(field) {
            None | Some(AttributeValue::Null) => NULL_KEY.to_string(),
            Some(value) => value.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Summarize every cluster, preserving cluster order.
///
/// Clusters are processed in parallel with rayon.
pub fn summarize(
    clusters: &[Cluster],
    max_cluster_size: usize,
    breakdown_field: Option<&str>,
) -> Vec<ClusterSummary> {
    clusters
        .par_iter()
        .map(|cluster| {
            let feature_count = cluster.len();
            let relative_size = if max_cluster_size == 0 {
                0.0
            } else {
                feature_count as f64 / max_cluster_size as f64
            };

            ClusterSummary {
                id: cluster.id,
                x: cluster.geometry.x,
                y: cluster.geometry.y,
                z: cluster.geometry.z,
                feature_count,
                relative_size,
                breakdown: breakdown_field.map(|f| attribute_breakdown(cluster, f)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::{Feature, Point};
    use crate::processors::clustering::{cluster_features, IdIssuer};

    fn answer(x: f64, value: AttributeValue) -> Feature {
        Feature::new(Point::new(x, 0.0)).with_attribute("answer", value)
    }

    #[test]
    fn test_summarize() {
        let features = vec![
            answer(0.0, AttributeValue::Text("yes".to_string())),
            answer(1.0, AttributeValue::Text("no".to_string())),
            answer(2.0, AttributeValue::Text("yes".to_string())),
            answer(3.0, AttributeValue::Null),
            answer(100.0, AttributeValue::Integer(5)),
        ];
        let mut ids = IdIssuer::new();
        let pass = cluster_features(features, 10.0, &mut ids);

        let summaries = summarize(&pass.clusters, pass.max_cluster_size, Some("answer"));
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, 0);
        assert_eq!(summaries[0].feature_count, 4);
        assert_eq!(summaries[0].relative_size, 1.0);
        assert_eq!(summaries[1].relative_size, 0.25);

        let breakdown = summaries[0].breakdown.as_ref().unwrap();
        assert_eq!(breakdown.get("yes"), Some(&2));
        assert_eq!(breakdown.get("no"), Some(&1));
        assert_eq!(breakdown.get(NULL_KEY), Some(&1));

        let other = summaries[1].breakdown.as_ref().unwrap();
        assert_eq!(other.get("5"), Some(&1));
    }

    #[test]
    fn test_summarize_without_breakdown() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![Feature::new(Point::new(0.0, 0.0))], 10.0, &mut ids);
        let summaries = summarize(&pass.clusters, pass.max_cluster_size, None);
        assert!(summaries[0].breakdown.is_none());
        assert!(summarize(&[], 0, None).is_empty());
    }

    #[test]
    fn test_missing_field_counts_as_null() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![Feature::new(Point::new(0.0, 0.0))], 10.0, &mut ids);
        let breakdown = attribute_breakdown(&pass.clusters[0], "absent");
        assert_eq!(breakdown.get(NULL_KEY), Some(&1));
    }
}
