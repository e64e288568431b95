//! Point features as delivered by a feature source.
//!
//! The shapes here follow the JSON feature-set format returned by a
//! feature-service `query` request, so the same types deserialize both
//! remote responses and local `.json` files.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SpatialReference;

/// A point geometry with optional elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Elevation. `Some` is the geometry's `hasZ` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    /// Creates a 2D point.
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    /// Creates a point carrying elevation.
    #[inline]
    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Whether the geometry carries elevation.
    #[inline]
    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    /// Returns the same point without elevation.
    #[inline]
    pub fn flattened(&self) -> Self {
        Self::new(self.x, self.y)
    }
}

/// A scalar attribute value. Anything else a service might send is rejected
/// at deserialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Integer(i64),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Parses a raw text cell (CSV, PLY) into the narrowest matching value.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttributeValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return AttributeValue::Integer(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return AttributeValue::Number(f);
        }
        AttributeValue::Text(raw.to_string())
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Number(n) => write!(f, "{}", n),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

/// Field name to value mapping, passed through untouched by the engine.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A point feature: geometry plus opaque attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Point,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Feature {
    pub fn new(geometry: Point) -> Self {
        Self {
            geometry,
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Returns the attribute value for `name`, if present.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

/// Error object a feature service embeds in an otherwise successful HTTP
/// response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// A coordinate as a service encodes it: a number, or a string such as
/// `"NaN"` for an empty point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireCoordinate {
    Number(f64),
    Text(String),
}

impl WireCoordinate {
    /// The coordinate value if it is a finite number.
    pub fn finite(&self) -> Option<f64> {
        let value = match self {
            WireCoordinate::Number(n) => *n,
            WireCoordinate::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Point geometry as it appears on the wire. Empty points carry null or
/// non-numeric coordinates.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPoint {
    #[serde(default)]
    pub x: Option<WireCoordinate>,
    #[serde(default)]
    pub y: Option<WireCoordinate>,
    #[serde(default)]
    pub z: Option<WireCoordinate>,
}

impl RawPoint {
    /// `None` for an empty point. An unusable `z` leaves the point 2D.
    pub fn to_point(&self) -> Option<Point> {
        let x = self.x.as_ref()?.finite()?;
        let y = self.y.as_ref()?.finite()?;
        Some(Point {
            x,
            y,
            z: self.z.as_ref().and_then(WireCoordinate::finite),
        })
    }
}

/// A raw feature record as it appears on the wire; geometry may be null or
/// an empty point.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub geometry: Option<RawPoint>,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Wire shape of a feature-set query response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFeatureResponse {
    #[serde(default)]
    pub features: Option<Vec<RawFeature>>,
    #[serde(default)]
    pub has_z: Option<bool>,
    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    pub exceeded_transfer_limit: Option<bool>,
    #[serde(default)]
    pub error: Option<ServiceError>,
}

/// A feature-set response after null geometries have been filtered out.
///
/// `features` is `None` when the response carried no feature list at all,
/// which the engine reports as a malformed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureResponse {
    pub features: Option<Vec<Feature>>,
    pub has_z: bool,
    pub spatial_reference: Option<SpatialReference>,
}

impl FeatureResponse {
    /// A well-formed response containing `features`.
    pub fn from_features(features: Vec<Feature>) -> Self {
        let has_z = features.iter().any(|f| f.geometry.has_z());
        Self {
            features: Some(features),
            has_z,
            spatial_reference: None,
        }
    }

    /// A response without a feature list.
    pub fn malformed() -> Self {
        Self::default()
    }

    /// Number of features, zero for a malformed response.
    pub fn len(&self) -> usize {
        self.features.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawFeatureResponse {
    /// Number of records on the wire, skipped ones included.
    pub fn record_count(&self) -> usize {
        self.features.as_ref().map_or(0, Vec::len)
    }

    /// Drops records without a usable geometry. Returns the cleaned response
    /// and the number of records skipped.
    pub fn into_response(self) -> (FeatureResponse, usize) {
        let mut skipped = 0usize;
        let features = self.features.map(|raw| {
            raw.into_iter()
                .filter_map(|f| {
                    let geometry = f.geometry.as_ref().and_then(RawPoint::to_point);
                    match geometry {
                        Some(geometry) => Some(Feature {
                            geometry,
                            attributes: f.attributes,
                        }),
                        None => {
                            skipped += 1;
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        });

        let response = FeatureResponse {
            features,
            has_z: self.has_z.unwrap_or(false),
            spatial_reference: self.spatial_reference,
        };
        (response, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_has_z() {
        assert!(!Point::new(1.0, 2.0).has_z());
        assert!(Point::with_z(1.0, 2.0, 3.0).has_z());
        assert_eq!(Point::with_z(1.0, 2.0, 3.0).flattened(), Point::new(1.0, 2.0));
    }

    #[test]
    fn test_attribute_parse() {
        assert_eq!(AttributeValue::parse(""), AttributeValue::Null);
        assert_eq!(AttributeValue::parse("42"), AttributeValue::Integer(42));
        assert_eq!(AttributeValue::parse("4.5"), AttributeValue::Number(4.5));
        assert_eq!(
            AttributeValue::parse("yes"),
            AttributeValue::Text("yes".to_string())
        );
    }

    #[test]
    fn test_deserialize_feature_set() {
        let json = r#"{
            "hasZ": true,
            "spatialReference": {"wkid": 4326},
            "features": [
                {"geometry": {"x": 1.0, "y": 2.0, "z": 3.0},
                 "attributes": {"OBJECTID": 1, "answer": "yes", "score": 2.5, "note": null}},
                {"geometry": null, "attributes": {"OBJECTID": 2}}
            ]
        }"#;

        let raw: RawFeatureResponse = serde_json::from_str(json).unwrap();
        let (response, skipped) = raw.into_response();

        assert_eq!(skipped, 1);
        assert!(response.has_z);
        assert_eq!(response.spatial_reference, Some(SpatialReference::new(4326)));

        let features = response.features.unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry, Point::with_z(1.0, 2.0, 3.0));
        assert_eq!(
            features[0].attribute("OBJECTID"),
            Some(&AttributeValue::Integer(1))
        );
        assert_eq!(
            features[0].attribute("score"),
            Some(&AttributeValue::Number(2.5))
        );
        assert!(features[0].attribute("note").unwrap().is_null());
    }

    #[test]
    fn test_missing_feature_list_is_malformed() {
        let raw: RawFeatureResponse = serde_json::from_str(r#"{"hasZ": false}"#).unwrap();
        let (response, _) = raw.into_response();
        assert!(response.features.is_none());
        assert_eq!(response.len(), 0);
    }

    #[test]
    fn test_empty_points_are_skipped() {
        let json = r#"{
            "features": [
                {"geometry": {"x": null, "y": null}, "attributes": {"OBJECTID": 1}},
                {"geometry": {"x": "NaN", "y": "NaN"}, "attributes": {"OBJECTID": 2}},
                {"geometry": {"x": 4.0, "y": 5.0, "z": "NaN"}, "attributes": {"OBJECTID": 3}},
                {"geometry": {}, "attributes": {"OBJECTID": 4}}
            ]
        }"#;

        let raw: RawFeatureResponse = serde_json::from_str(json).unwrap();
        assert_eq!(raw.record_count(), 4);

        let (response, skipped) = raw.into_response();
        assert_eq!(skipped, 3);
        let features = response.features.unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry, Point::new(4.0, 5.0));
        assert_eq!(
            features[0].attribute("OBJECTID"),
            Some(&AttributeValue::Integer(3))
        );
    }
}
