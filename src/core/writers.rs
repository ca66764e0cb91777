//! Data writers for regrouping outputs.
//!
//! This module provides functions for writing:
//! - The regrouped particle table (CSV)
//! - A per-particle assignment report (CSV) for checking the new groups
//! - Space-separated label files (grouping times, derived boundaries)

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;

use super::loaders::ParticleTable;
use super::timestamps::DISPLAY_FORMAT;

/// Column headers of the assignment report.
pub const REPORT_HEADERS: [&str; 4] = ["blob/path", "timestamp", "exp_group_id_org", "exp_group_id_new"];

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

    /// Report columns of different lengths.
    #[error("report column length mismatch: {paths} paths, {timestamps} timestamps, {original} original ids, {new} new ids")]
    LengthMismatch {
        paths: usize,
        timestamps: usize,
        original: usize,
        new: usize,
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

/// Write rows through a CSV writer, mapping errors to this path.
fn write_csv_rows<I, R>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    csv_writer.write_record(header).map_err(|e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    })?;

    for row in rows {
        csv_writer.write_record(row).map_err(|e| WriteError::CsvError {
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

/// Write a particle table back to CSV, headers first.
///
/// # Errors
///
/// Returns an error if parent directories or the file cannot be created, or
/// a row fails to serialize.
pub fn write_table(path: &Path, table: &ParticleTable) -> Result<()> {
    let header: Vec<&str> = table.headers.iter().map(String::as_str).collect();
    write_csv_rows(path, &header, &table.rows)
}

/// Write the per-particle group assignment report.
///
/// One row per particle with its blob path, acquisition time and its group
/// ids before and after regrouping. The timestamp is prefixed with `'` so
/// spreadsheet tools keep it as text.
pub fn write_assignment_report<S: AsRef<str>>(
    path: &Path,
    paths: &[S],
    timestamps: &[NaiveDateTime],
    original: &[i64],
    new: &[i64],
) -> Result<()> {
    let n = paths.len();
    if timestamps.len() != n || original.len() != n || new.len() != n {
        return Err(WriteError::LengthMismatch {
            paths: n,
            timestamps: timestamps.len(),
            original: original.len(),
            new: new.len(),
        });
    }

    let rows = (0..n).map(|i| {
        [
            paths[i].as_ref().to_string(),
            format!("'{}", timestamps[i].format(DISPLAY_FORMAT)),
            original[i].to_string(),
            new[i].to_string(),
        ]
    });

    write_csv_rows(path, &REPORT_HEADERS, rows)
}

/// Write labels on a single line separated by spaces, without a trailing
/// newline, so the file can be pasted straight into `--grouping-times`.
pub fn write_labels<S: AsRef<str>>(path: &Path, labels: &[S]) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    let line = labels.iter().map(|l| l.as_ref()).collect::<Vec<_>>().join(" ");
    writer
        .write_all(line.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })?;

    Ok(())
}
