//! Command-line interface for the clustering engine.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};

use crate::config::{ClusterPipelineConfig, EngineConfig, SpatialReference};
use crate::core::features::Point;
use crate::core::writers;
use crate::processors::{summarize, ClusterEngine};
use crate::source::{is_remote, source_for_location};

#[derive(Parser)]
#[command(name = "feature-cluster")]
#[command(about = "Cluster point features from a feature service or local file", version)]
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

/// Engine options shared by every subcommand. Unset flags fall back to the
/// config file.
#[derive(Args, Debug, Clone)]
struct EngineArgs {
    /// Feature-service layer URL or local CSV/JSON/PLY file
    source: Option<String>,
    /// Maximum distance between a feature and a cluster nucleus
    #[arg(short, long)]
    tolerance: Option<f64>,
    /// Use elevation in distance computation
    #[arg(long)]
    use_z: bool,
    /// Spatial reference, e.g. 4326, EPSG:3857 or wkid:102100
    #[arg(short, long)]
    spatial_reference: Option<SpatialReference>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one clustering pass and export the results
    Cluster {
        #[command(flatten)]
        engine: EngineArgs,
        /// Output directory for result files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Attribute field counted per cluster in the summary
        #[arg(long)]
        breakdown_field: Option<String>,
        /// Also write one row per feature with its cluster id
        #[arg(long)]
        membership: bool,
    },

    /// Find the cluster a point would fall into
    Locate {
        #[command(flatten)]
        engine: EngineArgs,
        #[arg(long, allow_hyphen_values = true)]
        x: f64,
        #[arg(long, allow_hyphen_values = true)]
        y: f64,
        #[arg(long, allow_hyphen_values = true)]
        z: Option<f64>,
    },

    /// Re-cluster repeatedly, reporting how clusters evolve between refreshes
    Refresh {
        #[command(flatten)]
        engine: EngineArgs,
        /// Number of passes to run
        #[arg(long, default_value_t = 3)]
        passes: u32,
        /// Seconds to wait between passes
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            format!("{}...", value.chars().take(34).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
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

    let config = match &cli.config {
        Some(path) => match ClusterPipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                ClusterPipelineConfig::default()
            }
        },
        None => ClusterPipelineConfig::default(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Cluster { engine, output_dir, breakdown_field, membership } => runtime.block_on(
            cmd_cluster(&engine, output_dir, breakdown_field, membership, &config),
        ),
        Commands::Locate { engine, x, y, z } => {
            let point = Point { x, y, z };
            runtime.block_on(cmd_locate(&engine, point, &config))
        }
        Commands::Refresh { engine, passes, interval_secs } => {
            runtime.block_on(cmd_refresh(&engine, passes, interval_secs, &config))
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Merge command-line overrides into the configured engine section.
fn engine_config(args: &EngineArgs, config: &ClusterPipelineConfig) -> EngineConfig {
    let mut engine = config.engine.clone();
    if let Some(source) = &args.source {
        engine.source_location = Some(source.clone());
    }
    if let Some(tolerance) = args.tolerance {
        engine.tolerance = tolerance;
    }
    if args.use_z {
        engine.use_z = true;
    }
    if let Some(sr) = args.spatial_reference {
        engine.spatial_reference = Some(sr);
    }
    // Local files carry no reference system of their own.
    if engine.spatial_reference.is_none()
        && engine
            .source_location
            .as_deref()
            .is_some_and(|loc| !loc.trim().is_empty() && !is_remote(loc))
    {
        engine.spatial_reference = Some(SpatialReference::WGS84);
    }
    engine
}

fn build_engine(args: &EngineArgs, config: &ClusterPipelineConfig) -> Result<ClusterEngine> {
    let engine_config = engine_config(args, config);
    let location = engine_config.source_location.clone().unwrap_or_default();
    let source = source_for_location(&location, &config.source)
        .with_context(|| format!("cannot open feature source {}", location))?;
    ClusterEngine::try_new(&engine_config, source).context("cannot start cluster engine")
}

/// Stem used for output files.
fn output_stem(location: &str) -> String {
    if is_remote(location) {
        return "feature_service".to_string();
    }
    Path::new(location)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("features")
        .to_string()
}

async fn cmd_cluster(
    args: &EngineArgs,
    output_dir: Option<PathBuf>,
    breakdown_field: Option<String>,
    membership: bool,
    config: &ClusterPipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let mut engine = build_engine(args, config)?;
    let location = engine_config(args, config).source_location.unwrap_or_default();

    let spinner = create_spinner("Fetching and clustering features...");
    let result = engine.compute_clusters().await;
    spinner.finish_and_clear();
    let clusters = result.context("clustering failed")?;

    let breakdown_field = breakdown_field.or_else(|| config.output.breakdown_field.clone());
    let summaries = summarize(
        &clusters,
        engine.current_max_cluster_size(),
        breakdown_field.as_deref(),
    );

    let out_dir = output_dir.unwrap_or_else(|| {
        if is_remote(&location) {
            PathBuf::from(".")
        } else {
            Path::new(&location)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .to_path_buf()
        }
    });
    let stem = output_stem(&location);

    let clusters_path = out_dir.join(format!("{}_clusters.csv", stem));
    writers::write_clusters_csv(&clusters_path, &clusters)?;
    info!("Clusters CSV -> {}", clusters_path.display());

    let summary_path = out_dir.join(format!("{}_summary.json", stem));
    writers::write_summary_json(&summary_path, &summaries)?;
    info!("Summary JSON -> {}", summary_path.display());

    if membership || config.output.write_membership {
        let membership_path = out_dir.join(format!("{}_membership.csv", stem));
        writers::write_membership_csv(&membership_path, &clusters)?;
        info!("Membership CSV -> {}", membership_path.display());
    }

    let feature_count: usize = clusters.iter().map(|c| c.len()).sum();
    let singletons = clusters.iter().filter(|c| c.len() == 1).count();

    print_summary(
        "Clustering Complete",
        &[
            ("Source", location),
            ("Features", feature_count.to_string()),
            ("Clusters", clusters.len().to_string()),
            ("Single-feature", singletons.to_string()),
            ("Largest cluster", engine.current_max_cluster_size().to_string()),
            ("Tolerance", engine.tolerance().unwrap_or_default().to_string()),
            ("Clusters CSV", clusters_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

async fn cmd_locate(args: &EngineArgs, point: Point, config: &ClusterPipelineConfig) -> Result<()> {
    let mut engine = build_engine(args, config)?;

    let spinner = create_spinner("Fetching and clustering features...");
    let result = engine.compute_clusters().await;
    spinner.finish_and_clear();
    result.context("clustering failed")?;

    let point_label = match point.z {
        Some(z) => format!("({}, {}, {})", point.x, point.y, z),
        None => format!("({}, {})", point.x, point.y),
    };

    match engine.find_cluster_containing(&point) {
        Some(cluster) => print_summary(
            "Cluster Found",
            &[
                ("Point", point_label),
                ("Cluster id", cluster.id.to_string()),
                (
                    "Nucleus",
                    format!("({:.3}, {:.3})", cluster.geometry.x, cluster.geometry.y),
                ),
                ("Features", cluster.len().to_string()),
                ("Largest cluster", engine.current_max_cluster_size().to_string()),
            ],
        ),
        None => print_summary(
            "No Cluster",
            &[
                ("Point", point_label),
                ("Clusters searched", engine.clusters().len().to_string()),
            ],
        ),
    }

    Ok(())
}

async fn cmd_refresh(
    args: &EngineArgs,
    passes: u32,
    interval_secs: u64,
    config: &ClusterPipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let mut engine = build_engine(args, config)?;
    let mut failures = 0u32;

    for pass in 1..=passes {
        let first_id = engine.next_cluster_id();
        match engine.compute_clusters().await {
            Ok(clusters) => println!(
                "pass {:>3}: {:>6} clusters, largest {:>5}, ids {}..{}",
                pass,
                clusters.len(),
                engine.current_max_cluster_size(),
                first_id,
                engine.next_cluster_id()
            ),
            Err(e) => {
                failures += 1;
                warn!("pass {} failed, keeping previous clusters: {}", pass, e);
            }
        }

        if pass < passes {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        }
    }

    print_summary(
        "Refresh Complete",
        &[
            ("Passes", passes.to_string()),
            ("Failed passes", failures.to_string()),
            ("Current clusters", engine.clusters().len().to_string()),
            ("Largest cluster", engine.current_max_cluster_size().to_string()),
            ("Next cluster id", engine.next_cluster_id().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}
