//! Writers for clustering results.
//!
//! - Cluster table CSV: one row per cluster with its nucleus and size
//! - Membership CSV: one row per feature with the id of its cluster
//! - Summary JSON: serialized [`ClusterSummary`] records

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use crate::processors::clustering::Cluster;
use crate::processors::summary::ClusterSummary;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn format_z(z: Option<f64>) -> String {
    z.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

fn write_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    csv_writer
        .write_record(header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in rows {
        csv_writer
            .write_record(&row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write one row per cluster: `cluster_id,x,y,z,feature_count`.
///
/// `z` is empty for clusters whose nucleus has no elevation.
///
/// # Example
///
/// ```no_run
/// use feature_cluster::core::writers::write_clusters_csv;
/// use std::path::Path;
///
/// write_clusters_csv(Path::new("clusters.csv"), &[]).unwrap();
/// ```
pub fn write_clusters_csv(path: &Path, clusters: &[Cluster]) -> Result<()> {
    write_rows(
        path,
        &["cluster_id", "x", "y", "z", "feature_count"],
        clusters.iter().map(|c| {
            vec![
                c.id.to_string(),
                format!("{:.6}", c.geometry.x),
                format!("{:.6}", c.geometry.y),
                format_z(c.geometry.z),
                c.len().to_string(),
            ]
        }),
    )
}

/// Write one row per feature: `cluster_id,x,y,z`, grouped by cluster in
/// cluster order and member order.
pub fn write_membership_csv(path: &Path, clusters: &[Cluster]) -> Result<()> {
    write_rows(
        path,
        &["cluster_id", "x", "y", "z"],
        clusters.iter().flat_map(|c| {
            c.features.iter().map(move |f| {
                vec![
                    c.id.to_string(),
                    format!("{:.6}", f.geometry.x),
                    format!("{:.6}", f.geometry.y),
                    format_z(f.geometry.z),
                ]
            })
        }),
    )
}

/// Write summaries as a pretty-printed JSON array.
pub fn write_summary_json(path: &Path, summaries: &[ClusterSummary]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    serde_json::to_writer_pretty(&mut writer, summaries).map_err(|e| WriteError::JsonError {
        path: path_str.clone(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
