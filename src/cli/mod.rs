//! Command-line interface for the exposure group regrouper.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};

use crate::config::RegrouperConfig;
use crate::core::{loaders, timestamps, writers};
use crate::processors::{self, summary, Record, RegroupPlan};
use crate::visualization::{self, HistogramPlot};

#[derive(Parser)]
#[command(name = "optgrouper")]
#[command(about = "Split cryo-EM exposure groups by acquisition time", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split exposure groups at explicit times and/or by elapsed hours
    Regroup {
        /// Input particle table (CSV)
        #[arg(long)]
        infile: PathBuf,
        /// Passthrough table joined to the input on uid (CSV)
        #[arg(long)]
        infile_passthrough: PathBuf,
        /// Output particle table (CSV)
        #[arg(long)]
        outfile: PathBuf,
        /// Boundary times (yyyy-mm-dd_hh_mm_ss); each one starts a new sub-group
        #[arg(long, num_args = 0..)]
        grouping_times: Option<Vec<String>>,
        /// Split each group into further sub-groups every this many hours
        #[arg(long)]
        grouping_hours: Option<f64>,
        /// Minimum number of particles per group after an hours split
        #[arg(long)]
        min_ptcls_per_group: Option<usize>,
        /// Allow overwriting existing output files
        #[arg(long)]
        overwrite: bool,
        /// Do not require each exposure group to be sorted by timestamp
        #[arg(long)]
        skip_order_check: bool,
    },

    /// Scan gap thresholds and propose grouping times
    FindTimes {
        /// Input movie/micrograph table (CSV)
        #[arg(long)]
        infile: PathBuf,
        /// Root name for output files
        #[arg(long)]
        outfile_root: String,
        /// Smallest gap threshold to scan [sec]
        #[arg(long)]
        dt_thresh_min: i64,
        /// Largest gap threshold to scan [sec]
        #[arg(long)]
        dt_thresh_max: i64,
        /// Step between thresholds [sec]
        #[arg(long)]
        dt_thresh_step: i64,
        /// Number of bins for each gap histogram
        #[arg(long)]
        hist_num_bins: Option<usize>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("spinner template is valid"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 38 {
            format!("{}...", value.chars().take(35).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<38} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match RegrouperConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                RegrouperConfig::default()
            }
        },
        None => RegrouperConfig::default(),
    };

    let result = match cli.command {
        Commands::Regroup {
            infile,
            infile_passthrough,
            outfile,
            grouping_times,
            grouping_hours,
            min_ptcls_per_group,
            overwrite,
            skip_order_check,
        } => {
            let plan = build_plan(
                grouping_times,
                grouping_hours,
                min_ptcls_per_group,
                skip_order_check,
                &config,
            );
            cmd_regroup(&infile, &infile_passthrough, &outfile, &plan, overwrite, &config)
        }
        Commands::FindTimes {
            infile,
            outfile_root,
            dt_thresh_min,
            dt_thresh_max,
            dt_thresh_step,
            hist_num_bins,
        } => cmd_find_times(
            &infile,
            &outfile_root,
            (dt_thresh_min, dt_thresh_max, dt_thresh_step),
            hist_num_bins,
            &config,
        ),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Merge CLI overrides with config values into a regroup plan.
fn build_plan(
    grouping_times: Option<Vec<String>>,
    grouping_hours: Option<f64>,
    min_ptcls_per_group: Option<usize>,
    skip_order_check: bool,
    config: &RegrouperConfig,
) -> RegroupPlan {
    let boundaries = grouping_times.or_else(|| {
        let times = &config.grouping.times;
        (!times.is_empty()).then(|| times.clone())
    });
    let hours = grouping_hours.unwrap_or(config.grouping.hours);

    RegroupPlan {
        boundaries,
        // Zero or negative hours mean "no duration split"
        hours: (hours > 0.0).then_some(hours),
        min_per_group: min_ptcls_per_group.unwrap_or(config.grouping.min_ptcls_per_group),
        check_order: config.grouping.check_order && !skip_order_check,
    }
}

/// Paths of the side outputs written next to the regrouped table.
fn side_outputs(outfile: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (
        outfile.with_extension("report.csv"),
        outfile.with_extension("png"),
        outfile.with_extension("boundaries.txt"),
    )
}

/// Whether cutting `records` at `labels` gives back exactly `new_ids`.
fn reproduces_groups(records: &[Record], labels: &[String], new_ids: &[i64]) -> Result<bool> {
    let boundaries = processors::parse_boundaries(labels)?;
    let ids = processors::regroup_by_boundaries(records, &boundaries, false)?;
    Ok(ids == new_ids)
}

fn cmd_regroup(
    infile: &Path,
    infile_passthrough: &Path,
    outfile: &Path,
    plan: &RegroupPlan,
    overwrite: bool,
    config: &RegrouperConfig,
) -> Result<()> {
    let start = Instant::now();
    let columns = &config.dataset;

    plan.validate()?;
    if !overwrite && outfile.exists() {
        bail!(
            "Stop processing because {} already exists. Change --outfile, or specify --overwrite to overwrite it.",
            outfile.display()
        );
    }

    info!("Input: {}", infile.display());
    info!("Passthrough: {}", infile_passthrough.display());
    info!("Plan: {:?}", plan);

    let spinner = create_spinner("Loading particle tables...");
    let loaded = loaders::load_table(infile)
        .with_context(|| format!("failed to load {}", infile.display()))
        .and_then(|particles| {
            let passthrough = loaders::load_table(infile_passthrough)
                .with_context(|| format!("failed to load {}", infile_passthrough.display()))?;
            Ok((particles, passthrough))
        });
    spinner.finish_and_clear();
    let (particles, passthrough) = loaded?;
    let joined = loaders::inner_join(&particles, &passthrough, &columns.uid_column)
        .context("failed to join particle and passthrough tables")?;

    let paths = joined.column(&columns.path_column)?;
    let original = joined.group_ids(&columns.group_column)?;
    let records = Record::from_paths(&original, &paths, plan.check_order)?;

    let result = processors::regroup(&records, plan)?;

    // The output must list exactly the input particles, in input order
    let new_table = joined.with_column_replaced(&columns.group_column, &result.new_ids)?;
    if new_table.column(&columns.uid_column)? != particles.column(&columns.uid_column)? {
        bail!(
            "particles of {} and {} do not match one to one",
            infile.display(),
            infile_passthrough.display()
        );
    }

    println!("\n{}", result.summary);

    writers::write_table(outfile, &new_table)?;
    println!("New dataset file was saved as {}", outfile.display());

    let (report_path, hist_path, boundaries_path) = side_outputs(outfile);
    let stamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    writers::write_assignment_report(&report_path, &paths, &stamps, &original, &result.new_ids)?;
    println!("Group assignments for checking were saved as {}", report_path.display());

    let sizes: Vec<f64> = result.summary.group_sizes().iter().map(|&n| n as f64).collect();
    let hist = summary::histogram(&sizes, summary::sturges_bins(sizes.len()));
    let plot = HistogramPlot::new("Particles per exposure group", "# of particles per exposure group");
    match visualization::plot_histogram(&hist_path, &hist, &plot) {
        Ok(()) => println!("Histogram of particles per group was saved as {}", hist_path.display()),
        Err(e) => warn!("Skipping histogram {}: {}", hist_path.display(), e),
    }

    let labels: Vec<String> = processors::midpoint_boundaries(&records, &result.new_ids)
        .iter()
        .map(timestamps::format_label)
        .collect();
    if reproduces_groups(&records, &labels, &result.new_ids)? {
        writers::write_labels(&boundaries_path, &labels)?;
        println!("Boundaries reproducing the new groups were saved as {}", boundaries_path.display());
    } else {
        warn!(
            "Exposure groups overlap in time, so no boundary list reproduces the new groups; skipping {}",
            boundaries_path.display()
        );
    }

    let smallest = result
        .summary
        .smallest_group()
        .map(|(id, n)| format!("{} ({} particles)", id, n))
        .unwrap_or_else(|| "-".to_string());

    print_summary(
        "Regrouping Complete",
        &[
            ("Output file", outfile.display().to_string()),
            ("Particles", records.len().to_string()),
            ("Original groups", result.summary.original_group_count().to_string()),
            ("New groups", result.summary.new_group_count().to_string()),
            ("Smallest group", smallest),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_find_times(
    infile: &Path,
    outfile_root: &str,
    (dt_min, dt_max, dt_step): (i64, i64, i64),
    hist_num_bins: Option<usize>,
    config: &RegrouperConfig,
) -> Result<()> {
    let start = Instant::now();
    let finder = &config.finder;
    let bins = hist_num_bins.unwrap_or(finder.hist_num_bins);

    // Validate the scan range before touching the input
    processors::threshold_steps(dt_min, dt_max, dt_step)?;

    let spinner = create_spinner("Loading exposure table...");
    let table = loaders::load_table(infile).with_context(|| format!("failed to load {}", infile.display()));
    spinner.finish_and_clear();
    let table = table?;

    let key = table
        .first_present(&finder.path_columns)
        .ok_or_else(|| anyhow!("No movie or micrograph paths exist in {}", infile.display()))?;
    info!("Reading timestamps from column {}", key);

    let paths = table.column(key)?;
    let stamps = timestamps::extract_timestamps(&paths, true)?;
    let scans = processors::scan_thresholds(&stamps, dt_min, dt_max, dt_step)?;

    for scan in &scans {
        let t = scan.threshold_secs;
        println!(
            "\nδt thresh = {:5} : Number of δt above threshold = {:5}",
            t,
            scan.gaps_at_or_above.len()
        );

        let hist_path = PathBuf::from(format!("{}_dt{:05}_hist.png", outfile_root, t));
        let caption = format!("δt threshold = {} [sec] (total {} cases)", t, scan.gaps_at_or_above.len());
        let plot = HistogramPlot::new(&caption, "Elapsed time since previous movie/micrograph [sec]")
            .with_size(finder.plot_width, finder.plot_height);
        let hist = summary::histogram(&scan.gaps_at_or_above, bins);
        match visualization::plot_histogram(&hist_path, &hist, &plot) {
            Ok(()) => println!("\tHistogram saved as {}", hist_path.display()),
            Err(e) => warn!("Skipping histogram {}: {}", hist_path.display(), e),
        }

        let times_path = PathBuf::from(format!("{}_dt{:05}_grouping_times.txt", outfile_root, t));
        writers::write_labels(&times_path, &scan.boundary_labels())?;
        println!("\tGrouping times written in {}", times_path.display());
    }

    print_summary(
        "Grouping Time Scan Complete",
        &[
            ("Input file", infile.display().to_string()),
            ("Path column", key.to_string()),
            ("Exposures", stamps.len().to_string()),
            ("Thresholds", scans.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_regroup() {
        let cli = Cli::try_parse_from([
            "optgrouper",
            "-vv",
            "regroup",
            "--infile",
            "p.csv",
            "--infile-passthrough",
            "pt.csv",
            "--outfile",
            "out.csv",
            "--grouping-times",
            "2024-01-01_12_00_00",
            "2024-01-02_08_00_00",
            "--grouping-hours",
            "1.5",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Regroup {
                grouping_times,
                grouping_hours,
                overwrite,
                ..
            } => {
                assert_eq!(grouping_times.map(|t| t.len()), Some(2));
                assert_eq!(grouping_hours, Some(1.5));
                assert!(!overwrite);
            }
            _ => panic!("expected regroup"),
        }
    }

    #[test]
    fn test_build_plan_prefers_cli_over_config() {
        let mut config = RegrouperConfig::default();
        config.grouping.times = vec!["2024-01-01_00_00_00".into()];
        config.grouping.hours = 3.0;
        config.grouping.min_ptcls_per_group = 10;

        let plan = build_plan(None, None, None, false, &config);
        assert_eq!(plan.boundaries.as_ref().map(|b| b.len()), Some(1));
        assert_eq!(plan.hours, Some(3.0));
        assert_eq!(plan.min_per_group, 10);
        assert!(plan.check_order);

        let plan = build_plan(Some(vec![]), Some(0.0), Some(2), true, &config);
        assert_eq!(plan.boundaries, Some(vec![]));
        assert_eq!(plan.hours, None);
        assert_eq!(plan.min_per_group, 2);
        assert!(!plan.check_order);
    }

    #[test]
    fn test_build_plan_without_options_is_usage_error() {
        let plan = build_plan(None, None, None, false, &RegrouperConfig::default());
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_side_outputs() {
        let (report, png, bounds) = side_outputs(Path::new("out/regrouped.csv"));
        assert_eq!(report, PathBuf::from("out/regrouped.report.csv"));
        assert_eq!(png, PathBuf::from("out/regrouped.png"));
        assert_eq!(bounds, PathBuf::from("out/regrouped.boundaries.txt"));
    }

    #[test]
    fn test_regroup_end_to_end() {
        use std::fs;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(
            dir.join("particles.csv"),
            "uid,blob/path\n\
             1,J1/a_2024-01-01_11_00_00.mrc\n\
             2,J1/b_2024-01-01_11_30_00.mrc\n\
             3,J1/c_2024-01-01_12_00_00.mrc\n\
             4,J1/d_2024-01-01_13_00_00.mrc\n",
        )
        .unwrap();
        fs::write(
            dir.join("passthrough.csv"),
            "uid,ctf/exp_group_id\n4,0\n3,0\n2,0\n1,0\n",
        )
        .unwrap();

        let outfile = dir.join("regrouped.csv");
        let plan = RegroupPlan {
            boundaries: Some(vec!["2024-01-01_12_00_00".into()]),
            check_order: true,
            ..Default::default()
        };
        let config = RegrouperConfig::default();

        cmd_regroup(
            &dir.join("particles.csv"),
            &dir.join("passthrough.csv"),
            &outfile,
            &plan,
            false,
            &config,
        )
        .unwrap();

        let table = loaders::load_table(&outfile).unwrap();
        assert_eq!(table.group_ids("ctf/exp_group_id").unwrap(), vec![0, 0, 1, 1]);
        assert_eq!(table.column("uid").unwrap(), vec!["1", "2", "3", "4"]);

        let report = fs::read_to_string(dir.join("regrouped.report.csv")).unwrap();
        assert_eq!(report.lines().count(), 5);
        let bounds = fs::read_to_string(dir.join("regrouped.boundaries.txt")).unwrap();
        assert_eq!(bounds, "2024-01-01_11_45_00");

        // A second run refuses to clobber the output
        let again = cmd_regroup(
            &dir.join("particles.csv"),
            &dir.join("passthrough.csv"),
            &outfile,
            &plan,
            false,
            &config,
        );
        assert!(again.is_err());
    }

    #[test]
    fn test_regroup_interleaved_groups_skip_boundaries_file() {
        use std::fs;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(
            dir.join("particles.csv"),
            "uid,blob/path\n\
             1,J1/a_2024-01-01_10_00_00.mrc\n\
             2,J1/b_2024-01-01_10_10_00.mrc\n\
             3,J1/c_2024-01-01_10_20_00.mrc\n\
             4,J1/d_2024-01-01_13_20_00.mrc\n\
             5,J1/e_2024-01-01_13_30_00.mrc\n\
             6,J1/f_2024-01-01_13_40_00.mrc\n",
        )
        .unwrap();
        fs::write(
            dir.join("passthrough.csv"),
            "uid,ctf/exp_group_id\n1,0\n2,1\n3,0\n4,1\n5,0\n6,1\n",
        )
        .unwrap();

        let outfile = dir.join("regrouped.csv");
        let plan = RegroupPlan {
            hours: Some(1.0),
            check_order: true,
            ..Default::default()
        };

        cmd_regroup(
            &dir.join("particles.csv"),
            &dir.join("passthrough.csv"),
            &outfile,
            &plan,
            false,
            &RegrouperConfig::default(),
        )
        .unwrap();

        let table = loaders::load_table(&outfile).unwrap();
        assert_eq!(table.group_ids("ctf/exp_group_id").unwrap(), vec![0, 2, 0, 3, 1, 3]);
        assert!(dir.join("regrouped.report.csv").exists());
        // Midpoints of one group would also cut the other one
        assert!(!dir.join("regrouped.boundaries.txt").exists());
    }

    #[test]
    fn test_regroup_rejects_unmatched_passthrough() {
        use std::fs;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        fs::write(
            dir.join("particles.csv"),
            "uid,blob/path\n1,J1/a_2024-01-01_11_00_00.mrc\n2,J1/b_2024-01-01_11_30_00.mrc\n",
        )
        .unwrap();
        fs::write(dir.join("passthrough.csv"), "uid,ctf/exp_group_id\n1,0\n3,0\n").unwrap();

        let outfile = dir.join("regrouped.csv");
        let plan = RegroupPlan {
            hours: Some(1.0),
            ..Default::default()
        };
        let result = cmd_regroup(
            &dir.join("particles.csv"),
            &dir.join("passthrough.csv"),
            &outfile,
            &plan,
            false,
            &RegrouperConfig::default(),
        );

        assert!(result.is_err());
        assert!(!outfile.exists());
    }

    #[test]
    fn test_find_times_end_to_end() {
        use std::fs;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let infile = dir.join("micrographs.csv");
        fs::write(
            &infile,
            "uid,micrograph_blob/path\n\
             1,J2/m_2024-01-01_10_00_00.mrc\n\
             2,J2/m_2024-01-01_10_01_00.mrc\n\
             3,J2/m_2024-01-01_10_02_00.mrc\n\
             4,J2/m_2024-01-01_10_30_00.mrc\n\
             5,J2/m_2024-01-01_10_31_00.mrc\n\
             6,J2/m_2024-01-01_12_00_00.mrc\n",
        )
        .unwrap();

        let root = dir.join("scan");
        let root = root.to_str().unwrap();
        cmd_find_times(&infile, root, (60, 1800, 1740), Some(5), &RegrouperConfig::default()).unwrap();

        let low = fs::read_to_string(dir.join("scan_dt00060_grouping_times.txt")).unwrap();
        assert_eq!(low, "2024-01-01_10_29_59 2024-01-01_11_59_59");
        let high = fs::read_to_string(dir.join("scan_dt01800_grouping_times.txt")).unwrap();
        assert_eq!(high, "2024-01-01_11_59_59");
        assert!(!dir.join("scan_dt00120_grouping_times.txt").exists());
    }

    #[test]
    fn test_find_times_without_path_column() {
        use std::fs;
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let infile = dir.join("particles.csv");
        fs::write(&infile, "uid,blob/path\n1,J1/a_2024-01-01_10_00_00.mrc\n").unwrap();

        let root = dir.join("scan");
        let err = cmd_find_times(
            &infile,
            root.to_str().unwrap(),
            (60, 120, 60),
            None,
            &RegrouperConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("No movie or micrograph paths"));
        assert!(!dir.join("scan_dt00060_grouping_times.txt").exists());
    }
}
