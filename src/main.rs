use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use serde_json::json;

use pdr_fusion::io::{load_records, save_records};
use pdr_fusion::pipeline::{run_fused, run_labels};
use pdr_fusion::{FixSource, PipelineConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    /// Global alignment, EKF, global alignment
    Fused,
    /// Piecewise alignment trimmed to anchors
    Labels,
}

#[derive(Parser, Debug)]
#[command(name = "pdr_fuse")]
#[command(
    about = "Fuse PDR with GNSS/WiFi fixes and align to calibration anchors",
    long_about = None
)]
struct Args {
    /// Session file, one JSON record per line (.json or .json.gz)
    #[arg(long)]
    input: PathBuf,

    /// Where to write the processed records (NDJSON)
    #[arg(long)]
    output: Option<PathBuf>,

    /// JSON config file; missing keys take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "fused")]
    mode: Mode,

    /// Correct with WiFi fixes instead of GNSS
    #[arg(long)]
    use_wifi: bool,

    /// Drop repeated WiFi fixes within this many degrees
    #[arg(long)]
    wifi_dedup: Option<f64>,

    /// Snap near-anchor standstill samples before alignment
    #[arg(long)]
    standstill: bool,

    /// Refine labels through the EKF (labels mode)
    #[arg(long)]
    refine: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.use_wifi {
        config.fusion.fix_source = FixSource::Wifi;
    }
    if args.wifi_dedup.is_some() {
        config.wifi_dedup_tolerance = args.wifi_dedup;
    }
    config.standstill.enabled |= args.standstill;
    config.refine_labels_with_ekf |= args.refine;

    let mut records = load_records(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    if records.is_empty() {
        anyhow::bail!("{} contains no records", args.input.display());
    }
    log::info!("Loaded {} records from {}", records.len(), args.input.display());

    let report = match args.mode {
        Mode::Fused => serde_json::to_value(run_fused(&mut records, &config)?)?,
        Mode::Labels => serde_json::to_value(run_labels(&mut records, &config)?)?,
    };

    if let Some(out) = &args.output {
        save_records(out, &records).with_context(|| format!("writing {}", out.display()))?;
        log::info!("Wrote {} records to {}", records.len(), out.display());
    }

    let summary = json!({
        "input": args.input.display().to_string(),
        "mode": format!("{:?}", args.mode).to_lowercase(),
        "generated_at": Utc::now().to_rfc3339(),
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
