use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use flate2::read::GzDecoder;
use nav_rs::{Ekf23d, Ekf23dState, FilterConfig, Lla, NavError, SensorEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to session_*.json[.gz] log
    #[arg(long, conflicts_with = "golden_dir")]
    log: Option<PathBuf>,

    /// Directory of golden logs to batch replay (processes session_*.json[.gz])
    #[arg(long)]
    golden_dir: Option<PathBuf>,

    /// Filter configuration (JSON); missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Nominal GPS error (meters), overrides the configured GPS noise
    #[arg(long)]
    gps_error: Option<f64>,

    /// Stable-sort events by timestamp before replay
    #[arg(long, default_value_t = false)]
    sort: bool,

    /// Record a trajectory snapshot every N applied events (0 = final only)
    #[arg(long, default_value_t = 0)]
    snapshot_every: usize,

    /// Write the trajectory as JSON to this path (single-log mode)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Deserialize)]
struct SessionLog {
    origin: Lla,
    /// Filter start time [seconds]; defaults to the first event timestamp
    #[serde(default)]
    start_time: Option<f64>,
    events: Vec<SensorEvent>,
}

#[derive(Default, Serialize)]
struct SensorStats {
    applied: u64,
    rejected: u64,
    max_nis: f64,
}

struct ReplayOutcome {
    summary: serde_json::Value,
    origin: Lla,
    snapshots: Vec<Ekf23dState>,
}

#[derive(Serialize)]
struct Trajectory<'a> {
    log: String,
    generated_at: String,
    origin: Lla,
    snapshots: &'a [Ekf23dState],
}

fn load_log(path: &Path) -> anyhow::Result<SessionLog> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let log = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        serde_json::from_reader(BufReader::new(gz))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(log)
}

fn load_config(args: &Args) -> anyhow::Result<FilterConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => FilterConfig::default(),
    };
    if let Some(err) = args.gps_error {
        anyhow::ensure!(err.is_finite() && err > 0.0, "--gps-error must be positive");
        config.gps_noise_std = err;
    }
    Ok(config)
}

fn run_once(path: &Path, args: &Args, config: &FilterConfig) -> anyhow::Result<ReplayOutcome> {
    let mut log = load_log(path)?;
    if args.sort {
        log.events
            .sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
    }

    let t0 = log
        .start_time
        .or_else(|| log.events.first().map(SensorEvent::timestamp))
        .unwrap_or(0.0);
    let mut ekf = Ekf23d::new(t0, log.origin, config);
    log::info!(
        "Replaying {} events from {} (origin lat={:.6} lon={:.6})",
        log.events.len(),
        path.display(),
        log.origin.lat_deg,
        log.origin.lon_deg
    );

    let mut stats: BTreeMap<String, SensorStats> = BTreeMap::new();
    let mut out_of_order = 0u64;
    let mut snapshots = Vec::new();
    let mut applied = 0usize;

    for event in &log.events {
        let name = event
            .sensor()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "query".to_string());
        let entry = stats.entry(name).or_default();

        match ekf.apply(event) {
            Ok(innovation) => {
                entry.applied += 1;
                if let Some(innovation) = innovation {
                    entry.max_nis = entry.max_nis.max(innovation.nis);
                }
                applied += 1;
                if args.snapshot_every > 0 && applied % args.snapshot_every == 0 {
                    snapshots.push(ekf.snapshot());
                }
            }
            Err(err) => {
                entry.rejected += 1;
                if matches!(err, NavError::OutOfOrder { .. }) {
                    out_of_order += 1;
                }
            }
        }
    }
    snapshots.push(ekf.snapshot());

    let last = ekf.snapshot();
    let summary = json!({
        "log": path.display().to_string(),
        "events": log.events.len(),
        "duration_s": last.time - t0,
        "sensors": stats,
        "out_of_order": out_of_order,
        "final_position_enu": last.position,
        "final_geodetic": last.geodetic,
        "final_covariance_trace": last.covariance_trace,
    });
    Ok(ReplayOutcome {
        summary,
        origin: log.origin,
        snapshots,
    })
}

fn write_trajectory(path: &Path, log: &Path, origin: Lla, snapshots: &[Ekf23dState]) -> anyhow::Result<()> {
    let trajectory = Trajectory {
        log: log.display().to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        origin,
        snapshots,
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &trajectory)?;
    log::info!("Wrote {} snapshots to {}", snapshots.len(), path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut results = Vec::new();

    if let Some(dir) = args.golden_dir.as_ref() {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("session_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args, &config) {
                Ok(outcome) => results.push(outcome.summary),
                Err(e) => log::error!("Failed {}: {:#}", path.display(), e),
            }
        }
    } else if let Some(log_path) = args.log.as_ref() {
        let outcome = run_once(log_path, &args, &config)?;
        if let Some(output) = args.output.as_ref() {
            write_trajectory(output, log_path, outcome.origin, &outcome.snapshots)?;
        }
        results.push(outcome.summary);
    } else {
        anyhow::bail!("Provide --log or --golden-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
