//! Time-based regrouping of cryo-EM exposure groups.
//!
//! This crate provides tools for:
//! - Extracting acquisition timestamps from movie/micrograph file names
//! - Splitting exposure groups at explicit boundary times
//! - Splitting exposure groups by accumulated elapsed time with a size floor
//! - Scanning gap thresholds to propose boundary times
//! - Loading, joining and writing particle tables with group reports
//!
//! # Example
//!
//! ```no_run
//! use optgrouper::processors::{parse_boundaries, regroup_by_boundaries, Record};
//!
//! let paths = ["a_2024-01-01_11_00_00.tiff", "b_2024-01-01_12_30_00.tiff"];
//! let records = Record::from_paths(&[0, 0], &paths, true).unwrap();
//! let boundaries = parse_boundaries(&["2024-01-01_12_00_00"]).unwrap();
//! let new_ids = regroup_by_boundaries(&records, &boundaries, true).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{DatasetConfig, FinderConfig, GroupingConfig, RegrouperConfig};
pub use crate::core::loaders::ParticleTable;
pub use processors::{regroup, Record, RegroupError, RegroupPlan, Regrouping};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
