//! Configuration types for the regrouper.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::visualization::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Column names of the particle tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Key used to join the particle and passthrough tables
    #[serde(default = "default_uid_column")]
    pub uid_column: String,

    /// Column holding the movie/micrograph path of each particle
    #[serde(default = "default_path_column")]
    pub path_column: String,

    /// Column holding the exposure group id
    #[serde(default = "default_group_column")]
    pub group_column: String,
}

fn default_uid_column() -> String {
    "uid".to_string()
}

fn default_path_column() -> String {
    "blob/path".to_string()
}

fn default_group_column() -> String {
    "ctf/exp_group_id".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            uid_column: default_uid_column(),
            path_column: default_path_column(),
            group_column: default_group_column(),
        }
    }
}

/// Defaults for the regroup command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Boundary labels (`YYYY-MM-DD_HH_MM_SS`, optionally with prefix/suffix)
    #[serde(default)]
    pub times: Vec<String>,

    /// Split sub-groups every this many hours (0 disables)
    #[serde(default)]
    pub hours: f64,

    /// Minimum number of particles per group after a duration split
    #[serde(default)]
    pub min_ptcls_per_group: usize,

    /// Require each exposure group to be sorted by timestamp
    #[serde(default = "default_check_order")]
    pub check_order: bool,
}

fn default_check_order() -> bool {
    true
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            hours: 0.0,
            min_ptcls_per_group: 0,
            check_order: default_check_order(),
        }
    }
}

/// Defaults for the find-times command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Candidate path columns, first present one is used
    #[serde(default = "default_path_columns")]
    pub path_columns: Vec<String>,

    /// Number of bins of each gap histogram
    #[serde(default = "default_hist_num_bins")]
    pub hist_num_bins: usize,

    #[serde(default = "default_plot_width")]
    pub plot_width: u32,

    #[serde(default = "default_plot_height")]
    pub plot_height: u32,
}

fn default_path_columns() -> Vec<String> {
    vec!["movie_blob/path".to_string(), "micrograph_blob/path".to_string()]
}

fn default_hist_num_bins() -> usize {
    20
}

fn default_plot_width() -> u32 {
    DEFAULT_WIDTH
}

fn default_plot_height() -> u32 {
    DEFAULT_HEIGHT
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            path_columns: default_path_columns(),
            hist_num_bins: default_hist_num_bins(),
            plot_width: default_plot_width(),
            plot_height: default_plot_height(),
        }
    }
}

/// Main configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegrouperConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub grouping: GroupingConfig,

    #[serde(default)]
    pub finder: FinderConfig,
}

impl RegrouperConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: RegrouperConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
