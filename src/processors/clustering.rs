//! Greedy tolerance clustering of point features.
//!
//! Features are visited once in the order the source returned them. Each one
//! joins the first existing cluster (in creation order) whose nucleus lies
//! within `tolerance`, or seeds a new cluster. A nucleus is the geometry of
//! the seed feature and is never moved, so the result is order dependent and
//! runs in O(n·k) for n features and k clusters.
//!
//! # Example
//!
//! ```
//! use feature_cluster::core::features::{Feature, Point};
//! use feature_cluster::processors::clustering::{cluster_features, IdIssuer};
//!
//! let features = vec![
//!     Feature::new(Point::new(0.0, 0.0)),
//!     Feature::new(Point::new(5.0, 0.0)),
//!     Feature::new(Point::new(50.0, 0.0)),
//! ];
//! let mut ids = IdIssuer::new();
//! let pass = cluster_features(features, 10.0, &mut ids);
//! assert_eq!(pass.clusters.len(), 2);
//! assert_eq!(pass.max_cluster_size, 2);
//! ```

use serde::Serialize;

use crate::core::features::{Feature, Point};

/// Cluster identifier, unique for the lifetime of an engine.
pub type ClusterId = u64;

/// A group of features around a fixed nucleus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    /// Geometry of the seed feature.
    pub geometry: Point,
    /// Members in the order they were assigned. Never empty.
    pub features: Vec<Feature>,
}

impl Cluster {
    fn seed(id: ClusterId, feature: Feature) -> Self {
        Self {
            id,
            geometry: feature.geometry,
            features: vec![feature],
        }
    }

    /// Number of member features.
    #[inline]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false for clusters produced by a pass.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether a feature at `point` would be assigned to this cluster.
    #[inline]
    pub fn accepts(&self, point: &Point, tolerance: f64) -> bool {
        within_tolerance(point, &self.geometry, tolerance)
    }
}

/// Issues cluster ids. One issuer lives as long as its engine; ids are
/// handed out by post-increment starting at 0 and never reused.
#[derive(Debug, Default)]
pub struct IdIssuer {
    next: ClusterId,
}

impl IdIssuer {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    /// The id the next call to [`IdIssuer::issue`] will return.
    #[inline]
    pub fn peek(&self) -> ClusterId {
        self.next
    }

    #[inline]
    pub fn issue(&mut self) -> ClusterId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Distance between a feature and a nucleus as used by the clustering rule.
///
/// Without elevation on the feature this is the planar Euclidean distance.
/// With elevation it is the cube root of the squared 3D offset,
/// `cbrt(dx² + dy² + dz²)`, which is deliberately not the Euclidean norm: it
/// shrinks large separations so more elevated points merge. Returns `NaN`
/// when the feature has elevation and the nucleus does not.
pub fn cluster_distance(feature: &Point, nucleus: &Point) -> f64 {
    let dx = feature.x - nucleus.x;
    let dy = feature.y - nucleus.y;

    match feature.z {
        Some(z) => {
            let dz = nucleus.z.map_or(f64::NAN, |nz| z - nz);
            (dx * dx + dy * dy + dz * dz).cbrt()
        }
        None => (dx * dx + dy * dy).sqrt(),
    }
}

/// The proximity predicate: `cluster_distance <= tolerance`. `NaN` distances
/// never qualify.
#[inline]
pub fn within_tolerance(feature: &Point, nucleus: &Point, tolerance: f64) -> bool {
    cluster_distance(feature, nucleus) <= tolerance
}

/// Outcome of one clustering pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterPass {
    /// Clusters in creation order.
    pub clusters: Vec<Cluster>,
    /// Largest member count, 0 when no features were supplied.
    pub max_cluster_size: usize,
    /// Total features assigned.
    pub feature_count: usize,
}

/// Run one greedy first-fit pass over `features`.
///
/// New clusters draw their ids from `ids`, so successive passes sharing an
/// issuer never repeat an id.
pub fn cluster_features(
    features: impl IntoIterator<Item = Feature>,
    tolerance: f64,
    ids: &mut IdIssuer,
) -> ClusterPass {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut feature_count = 0usize;

    for feature in features {
        feature_count += 1;

        match clusters
            .iter_mut()
            .find(|c| c.accepts(&feature.geometry, tolerance))
        {
            Some(cluster) => cluster.features.push(feature),
            None => clusters.push(Cluster::seed(ids.issue(), feature)),
        }
    }

    let max_cluster_size = clusters.iter().map(Cluster::len).max().unwrap_or(0);

    ClusterPass {
        clusters,
        max_cluster_size,
        feature_count,
    }
}

/// First cluster in creation order that would accept a feature at `point`.
pub fn locate<'a>(clusters: &'a [Cluster], point: &Point, tolerance: f64) -> Option<&'a Cluster> {
    clusters.iter().find(|c| c.accepts(point, tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64) -> Feature {
        Feature::new(Point::new(x, y))
    }

    fn at_z(x: f64, y: f64, z: f64) -> Feature {
        Feature::new(Point::with_z(x, y, z))
    }

    #[test]
    fn test_id_issuer_post_increments() {
        let mut ids = IdIssuer::new();
        assert_eq!(ids.peek(), 0);
        assert_eq!(ids.issue(), 0);
        assert_eq!(ids.issue(), 1);
        assert_eq!(ids.peek(), 2);
    }

    #[test]
    fn test_planar_distance() {
        let d = cluster_distance(&Point::new(3.0, 4.0), &Point::new(0.0, 0.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_cube_root_distance_is_intentional_deviation() {
        // 3D offset (2, 2, 2): Euclidean would be sqrt(12) ~ 3.46,
        // the clustering rule uses cbrt(12) ~ 2.29.
        let d = cluster_distance(&Point::with_z(2.0, 2.0, 2.0), &Point::with_z(0.0, 0.0, 0.0));
        assert!((d - 12f64.cbrt()).abs() < 1e-12);
        assert!(d < 12f64.sqrt());

        // cbrt(dx²) = 1000 → dx = 1000^1.5 ≈ 31623, far beyond a tolerance of
        // 1000 in Euclidean terms but exactly on the boundary here.
        let dx = 1000f64.powf(1.5);
        assert!(within_tolerance(
            &Point::with_z(dx * (1.0 - 1e-9), 0.0, 0.0),
            &Point::with_z(0.0, 0.0, 0.0),
            1000.0
        ));
    }

    #[test]
    fn test_elevated_feature_against_flat_nucleus_never_matches() {
        let nucleus = Point::new(0.0, 0.0);
        assert!(cluster_distance(&Point::with_z(0.0, 0.0, 0.0), &nucleus).is_nan());
        assert!(!within_tolerance(&Point::with_z(0.0, 0.0, 0.0), &nucleus, 100.0));
    }

    #[test]
    fn test_flat_feature_against_elevated_nucleus_uses_planar_distance() {
        let nucleus = Point::with_z(0.0, 0.0, 500.0);
        assert!(within_tolerance(&Point::new(6.0, 8.0), &nucleus, 10.0));
    }

    #[test]
    fn test_reference_scenario() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![at(0.0, 0.0), at(5.0, 0.0), at(50.0, 0.0)], 10.0, &mut ids);

        assert_eq!(pass.clusters.len(), 2);
        assert_eq!(pass.clusters[0].id, 0);
        assert_eq!(pass.clusters[0].geometry, Point::new(0.0, 0.0));
        assert_eq!(pass.clusters[0].len(), 2);
        assert_eq!(pass.clusters[1].id, 1);
        assert_eq!(pass.clusters[1].geometry, Point::new(50.0, 0.0));
        assert_eq!(pass.clusters[1].len(), 1);
        assert_eq!(pass.max_cluster_size, 2);
        assert_eq!(pass.feature_count, 3);
    }

    #[test]
    fn test_first_fit_not_best_fit() {
        // The third feature is within tolerance of both nuclei and closer to
        // the second, but joins the first-created.
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![at(0.0, 0.0), at(15.0, 0.0), at(9.0, 0.0)], 10.0, &mut ids);

        assert_eq!(pass.clusters.len(), 2);
        assert_eq!(pass.clusters[0].len(), 2);
        assert_eq!(pass.clusters[0].features[1].geometry, Point::new(9.0, 0.0));
        assert_eq!(pass.clusters[1].len(), 1);
    }

    #[test]
    fn test_nucleus_is_not_a_centroid() {
        // A chain of points each 6 apart: the nucleus stays at the origin, so
        // the third point (12 away) starts a new cluster.
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![at(0.0, 0.0), at(6.0, 0.0), at(12.0, 0.0)], 10.0, &mut ids);

        assert_eq!(pass.clusters.len(), 2);
        assert_eq!(pass.clusters[0].geometry, Point::new(0.0, 0.0));
        assert_eq!(pass.clusters[1].geometry, Point::new(12.0, 0.0));
    }

    #[test]
    fn test_tolerance_boundary_is_inclusive() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![at(0.0, 0.0), at(10.0, 0.0)], 10.0, &mut ids);
        assert_eq!(pass.clusters.len(), 1);
    }

    #[test]
    fn test_3d_boundary() {
        let tolerance: f64 = 10.0;
        // cbrt(dz²) = tolerance → dz = tolerance^1.5
        let edge = tolerance.powf(1.5);
        let eps = 1e-6;

        let mut ids = IdIssuer::new();
        let inside = cluster_features(
            vec![at_z(0.0, 0.0, 0.0), at_z(0.0, 0.0, edge - eps)],
            tolerance,
            &mut ids,
        );
        assert_eq!(inside.clusters.len(), 1);

        let outside = cluster_features(
            vec![at_z(0.0, 0.0, 0.0), at_z(0.0, 0.0, edge + eps)],
            tolerance,
            &mut ids,
        );
        assert_eq!(outside.clusters.len(), 2);
    }

    #[test]
    fn test_ids_continue_across_passes() {
        let mut ids = IdIssuer::new();
        let first = cluster_features(vec![at(0.0, 0.0), at(100.0, 0.0)], 10.0, &mut ids);
        let second = cluster_features(vec![at(0.0, 0.0)], 10.0, &mut ids);

        assert_eq!(first.clusters[1].id, 1);
        assert_eq!(second.clusters[0].id, 2);
    }

    #[test]
    fn test_empty_input() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(Vec::new(), 10.0, &mut ids);
        assert!(pass.clusters.is_empty());
        assert_eq!(pass.max_cluster_size, 0);
        assert_eq!(ids.peek(), 0);
    }

    #[test]
    fn test_locate() {
        let mut ids = IdIssuer::new();
        let pass = cluster_features(vec![at(0.0, 0.0), at(50.0, 0.0)], 10.0, &mut ids);

        assert_eq!(locate(&pass.clusters, &Point::new(3.0, 3.0), 10.0).map(|c| c.id), Some(0));
        assert_eq!(locate(&pass.clusters, &Point::new(55.0, 0.0), 10.0).map(|c| c.id), Some(1));
        assert!(locate(&pass.clusters, &Point::new(25.0, 0.0), 10.0).is_none());
    }
}
