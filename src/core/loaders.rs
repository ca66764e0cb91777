//! Particle table loading.
//!
//! Particle datasets are exchanged as headered CSV files whose column names
//! follow cryoSPARC field names (`uid`, `blob/path`, `ctf/exp_group_id`, ...).
//! Columns are kept as strings: regrouping only ever reads the blob path and
//! the exposure group id, and everything else is written back unchanged.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

/// Errors that can occur during table loading and joining.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Row {row}: '{value}' is not an integer exposure group id")]
    InvalidGroupId { row: usize, value: String },

    #[error("Row count mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Duplicate key '{0}' in join table")]
    DuplicateKey(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// A particle dataset: ordered column names plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl ParticleTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            source_path: None,
        }
    }

    /// Returns the number of particles (rows).
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Return the first of `names` that is a column of this table.
    pub fn first_present<'a, S: AsRef<str>>(&self, names: &'a [S]) -> Option<&'a str> {
        names
            .iter()
            .map(|n| n.as_ref())
            .find(|n| self.column_index(n).is_some())
    }

    /// All cells of one column, in row order.
    pub fn column(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| LoaderError::MissingColumn(name.to_string()))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
            .collect())
    }

    /// Parse an integer column such as `ctf/exp_group_id`.
    pub fn group_ids(&self, name: &str) -> Result<Vec<i64>> {
        self.column(name)?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| {
                cell.trim().parse::<i64>().map_err(|_| LoaderError::InvalidGroupId {
                    row,
                    value: cell.to_string(),
                })
            })
            .collect()
    }

    /// Copy of this table with one column's values replaced.
    pub fn with_column_replaced<S: ToString>(&self, name: &str, values: &[S]) -> Result<ParticleTable> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| LoaderError::MissingColumn(name.to_string()))?;
        if values.len() != self.len() {
            return Err(LoaderError::LengthMismatch {
                expected: self.len(),
                found: values.len(),
            });
        }

        let mut table = self.clone();
        for (row, value) in table.rows.iter_mut().zip(values) {
            if let Some(cell) = row.get_mut(idx) {
                *cell = value.to_string();
            }
        }
        Ok(table)
    }
}

/// Load a particle table from a headered CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row has the wrong number
/// of fields, or the table has no data rows.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<ParticleTable> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();

    let mut rows = Vec::with_capacity(4096);
    for result in reader.records() {
        let record = result?;
        rows.push(record.iter().map(String::from).collect());
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(ParticleTable {
        headers,
        rows,
        source_path: Some(path.to_path_buf()),
    })
}

/// Inner-join a particle table with its passthrough table on `key`.
///
/// Rows keep the order of `left`. Columns of `right` that `left` lacks are
/// appended; shared columns keep the values from `left`.
///
/// # Errors
///
/// The two tables must describe the same particles, so differing row counts
/// are rejected up front, as are a missing key column and duplicate keys in
/// `right`.
pub fn inner_join(left: &ParticleTable, right: &ParticleTable, key: &str) -> Result<ParticleTable> {
    if left.len() != right.len() {
        return Err(LoaderError::LengthMismatch {
            expected: left.len(),
            found: right.len(),
        });
    }

    let left_key = left
        .column_index(key)
        .ok_or_else(|| LoaderError::MissingColumn(key.to_string()))?;
    let right_key = right
        .column_index(key)
        .ok_or_else(|| LoaderError::MissingColumn(key.to_string()))?;

    let mut by_key: HashMap<&str, usize> = HashMap::with_capacity(right.len());
    for (i, row) in right.rows.iter().enumerate() {
        let k = row.get(right_key).map(String::as_str).unwrap_or("");
        if by_key.insert(k, i).is_some() {
            return Err(LoaderError::DuplicateKey(k.to_string()));
        }
    }

    let known: HashSet<&str> = left.headers.iter().map(String::as_str).collect();
    let extra: Vec<usize> = right
        .headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !known.contains(h.as_str()))
        .map(|(i, _)| i)
        .collect();

    let mut headers = left.headers.clone();
    headers.extend(extra.iter().map(|&i| right.headers[i].clone()));

    let mut rows = Vec::with_capacity(left.len());
    for row in &left.rows {
        let k = row.get(left_key).map(String::as_str).unwrap_or("");
        if let Some(&ri) = by_key.get(k) {
            let other = &right.rows[ri];
            let mut joined = row.clone();
            joined.extend(extra.iter().map(|&i| other.get(i).cloned().unwrap_or_default()));
            rows.push(joined);
        }
    }

    Ok(ParticleTable {
        headers,
        rows,
        source_path: left.source_path.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn table(headers: &[&str], rows: &[&[&str]]) -> ParticleTable {
        ParticleTable::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn test_load_table() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_csv(
            temp_dir.path(),
            "particles.csv",
            &[
                "uid,blob/path,ctf/exp_group_id",
                "11,J1/a_2024-01-01_10_00_00.mrc,0",
                "12,J1/b_2024-01-01_10_05_00.mrc,0",
            ],
        );

        let table = load_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.headers, vec!["uid", "blob/path", "ctf/exp_group_id"]);
        assert_eq!(table.column("uid").unwrap(), vec!["11", "12"]);
        assert_eq!(table.group_ids("ctf/exp_group_id").unwrap(), vec![0, 0]);
        assert_eq!(table.source_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_table_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_csv(temp_dir.path(), "empty.csv", &["uid,blob/path"]);
        assert!(matches!(load_table(&path), Err(LoaderError::EmptyFile(_))));
    }

    #[test]
    fn test_missing_column_and_bad_group_id() {
        let t = table(&["uid", "ctf/exp_group_id"], &[&["1", "0"], &["2", "x"]]);
        assert!(matches!(t.column("blob/path"), Err(LoaderError::MissingColumn(_))));
        match t.group_ids("ctf/exp_group_id") {
            Err(LoaderError::InvalidGroupId { row, value }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "x");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_first_present() {
        let t = table(&["uid", "micrograph_blob/path"], &[&["1", "a"]]);
        let candidates = ["movie_blob/path", "micrograph_blob/path"];
        assert_eq!(t.first_present(&candidates), Some("micrograph_blob/path"));
        assert_eq!(t.first_present(&["nope"]), None);
    }

    #[test]
    fn test_with_column_replaced_leaves_original() {
        let t = table(&["uid", "ctf/exp_group_id"], &[&["1", "0"], &["2", "0"]]);
        let replaced = t.with_column_replaced("ctf/exp_group_id", &[4, 5]).unwrap();
        assert_eq!(replaced.column("ctf/exp_group_id").unwrap(), vec!["4", "5"]);
        assert_eq!(t.column("ctf/exp_group_id").unwrap(), vec!["0", "0"]);

        assert!(matches!(
            t.with_column_replaced("ctf/exp_group_id", &[1]),
            Err(LoaderError::LengthMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_inner_join_keeps_left_order() {
        let left = table(
            &["uid", "blob/path"],
            &[&["3", "c"], &["1", "a"], &["2", "b"]],
        );
        let right = table(
            &["uid", "ctf/exp_group_id", "blob/path"],
            &[&["1", "10", "ignored"], &["2", "20", "ignored"], &["3", "30", "ignored"]],
        );

        let joined = inner_join(&left, &right, "uid").unwrap();
        assert_eq!(joined.headers, vec!["uid", "blob/path", "ctf/exp_group_id"]);
        assert_eq!(joined.column("uid").unwrap(), vec!["3", "1", "2"]);
        assert_eq!(joined.column("blob/path").unwrap(), vec!["c", "a", "b"]);
        assert_eq!(joined.group_ids("ctf/exp_group_id").unwrap(), vec![30, 10, 20]);
    }

    #[test]
    fn test_inner_join_drops_unmatched_and_rejects_mismatch() {
        let left = table(&["uid", "x"], &[&["1", "a"], &["9", "b"]]);
        let right = table(&["uid", "y"], &[&["1", "p"], &["2", "q"]]);
        let joined = inner_join(&left, &right, "uid").unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined.rows[0], vec!["1", "a", "p"]);

        let short = table(&["uid", "y"], &[&["1", "p"]]);
        assert!(matches!(
            inner_join(&left, &short, "uid"),
            Err(LoaderError::LengthMismatch { .. })
        ));

        let dup = table(&["uid", "y"], &[&["1", "p"], &["1", "q"]]);
        assert!(matches!(inner_join(&left, &dup, "uid"), Err(LoaderError::DuplicateKey(_))));
    }
}
