//! Loaders for point features stored in local files.
//!
//! Supported formats:
//! - CSV with `x`, `y` and optional `z` columns; every other column becomes an attribute
//! - Feature-set JSON (the same document a feature service returns from `query`)
//! - ASCII PLY vertex lists; non-coordinate properties become numeric attributes

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use super::features::{AttributeValue, Feature, FeatureResponse, Point, RawFeatureResponse};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// File formats recognized by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Ply,
}

impl FileFormat {
    /// Detects the format from the file extension (case-insensitive).
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("csv") => Ok(FileFormat::Csv),
            Some("json") => Ok(FileFormat::Json),
            Some("ply") => Ok(FileFormat::Ply),
            _ => Err(LoaderError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Load features from any supported file, dispatching on the extension.
///
/// `include_z` controls whether elevation read from the file is kept.
pub fn load_features<P: AsRef<Path>>(path: P, include_z: bool) -> Result<FeatureResponse> {
    let path = path.as_ref();
    let mut response = match FileFormat::detect(path)? {
        FileFormat::Csv => FeatureResponse::from_features(load_features_csv(path)?),
        FileFormat::Json => load_features_json(path)?,
        FileFormat::Ply => FeatureResponse::from_features(load_features_ply(path)?),
    };

    if !include_z {
        if let Some(features) = response.features.as_mut() {
            for feature in features.iter_mut() {
                feature.geometry = feature.geometry.flattened();
            }
        }
        response.has_z = false;
    }

    Ok(response)
}

/// Load point features from a CSV file.
///
/// The `x` and `y` columns are required (matched case-insensitively); a `z`
/// column is optional and an empty `z` cell yields a 2D point. Rows with
/// unparseable coordinates are rejected. A header without rows is an empty
/// feature set; a file without a header is [`LoaderError::EmptyFile`].
pub fn load_features_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect();

    let x_idx = *col_map
        .get("x")
        .ok_or_else(|| LoaderError::MissingColumns("x".to_string()))?;
    let y_idx = *col_map
        .get("y")
        .ok_or_else(|| LoaderError::MissingColumns("y".to_string()))?;
    let z_idx = col_map.get("z").copied();

    let mut features = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;

        let coord = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .map(str::trim)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| {
                    LoaderError::ParseError(format!("row {}: invalid {} coordinate", row + 1, name))
                })
        };

        let x = coord(x_idx, "x")?;
        let y = coord(y_idx, "y")?;
        let z = match z_idx {
            Some(i) if record.get(i).is_some_and(|s| !s.trim().is_empty()) => {
                Some(coord(i, "z")?)
            }
            _ => None,
        };

        let mut feature = Feature::new(Point { x, y, z });
        for (i, name) in headers.iter().enumerate() {
            if i == x_idx || i == y_idx || Some(i) == z_idx {
                continue;
            }
            let value = record.get(i).map_or(AttributeValue::Null, AttributeValue::parse);
            feature.attributes.insert(name.trim().to_string(), value);
        }
        features.push(feature);
    }

    Ok(features)
}

/// Load a feature-set JSON document.
///
/// A document without a `features` member is returned as-is so the caller can
/// report it as malformed.
pub fn load_features_json<P: AsRef<Path>>(path: P) -> Result<FeatureResponse> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let raw: RawFeatureResponse = serde_json::from_reader(BufReader::new(file))?;

    if let Some(err) = raw.error.as_ref() {
        return Err(LoaderError::ParseError(format!(
            "{} contains a service error {}: {}",
            path.display(),
            err.code,
            err.message
        )));
    }

    let (response, skipped) = raw.into_response();
    if skipped > 0 {
        log::warn!(
            "{}: skipped {} records without geometry",
            path.display(),
            skipped
        );
    }
    Ok(response)
}

/// Load point features from an ASCII PLY file.
///
/// Vertex elements need `x`, `y` and `z` properties; any other vertex
/// property (colors, intensities) is kept as a numeric attribute.
pub fn load_features_ply<P: AsRef<Path>>(path: P) -> Result<Vec<Feature>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex_element = false;
    let mut header_done = false;

    for line in &mut lines {
        let line = line?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(
                "only ASCII PLY is supported".to_string(),
            ));
        } else if stripped.starts_with("element") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            in_vertex_element = parts.get(1) == Some(&"vertex");
            if in_vertex_element {
                num_vertices = parts.last().and_then(|s| s.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            if let Some(name) = parts.last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let (x_idx, y_idx, z_idx) = match (prop_idx.get("x"), prop_idx.get("y"), prop_idx.get("z")) {
        (Some(&x), Some(&y), Some(&z)) => (x, y, z),
        _ => {
            return Err(LoaderError::MissingColumns(
                "PLY vertex needs x, y, z properties".to_string(),
            ))
        }
    };

    let mut features = Vec::with_capacity(num_vertices);

    for line in lines.take(num_vertices) {
        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < prop_names.len() {
            return Err(LoaderError::ParseError(format!(
                "vertex {} has {} values, expected {}",
                features.len(),
                values.len(),
                prop_names.len()
            )));
        }

        let parse = |idx: usize| -> Result<f64> {
            values[idx].parse::<f64>().map_err(|_| {
                LoaderError::ParseError(format!("invalid number '{}'", values[idx]))
            })
        };

        let mut feature = Feature::new(Point::with_z(parse(x_idx)?, parse(y_idx)?, parse(z_idx)?));
        for (i, name) in prop_names.iter().enumerate() {
            if i == x_idx || i == y_idx || i == z_idx {
                continue;
            }
            feature
                .attributes
                .insert(name.clone(), AttributeValue::parse(values[i]));
        }
        features.push(feature);
    }

    if features.len() != num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "header declares {} vertices, found {}",
            num_vertices,
            features.len()
        )));
    }

    Ok(features)
}
