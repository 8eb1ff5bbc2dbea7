use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::json;

use pdr_fusion::io::{load_records, save_records};
use pdr_fusion::pipeline::{run_labels, unify_labels, LabelReport};
use pdr_fusion::{PipelineConfig, Record};

#[derive(Parser, Debug)]
#[command(name = "label_batch")]
#[command(about = "Build merged training labels from a directory of sessions", long_about = None)]
struct Args {
    /// Directory of session files (*.json, *.json.gz)
    #[arg(long)]
    data_dir: PathBuf,

    /// Merged NDJSON label file
    #[arg(long)]
    output: PathBuf,

    /// JSON config file; missing keys take defaults
    #[arg(long)]
    config: Option<PathBuf>,
}

fn is_session_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    path.is_file() && (name.ends_with(".json") || name.ends_with(".json.gz"))
}

fn run_once(path: &Path, config: &PipelineConfig) -> anyhow::Result<(Vec<Record>, LabelReport)> {
    let mut records = load_records(path)?;
    let report = run_labels(&mut records, config)?;
    Ok((records, report))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(&args.data_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_session_file(p))
        .collect();
    paths.sort();
    if paths.is_empty() {
        anyhow::bail!("No session files in {}", args.data_dir.display());
    }

    let mut merged = Vec::new();
    let mut sessions = Vec::new();
    for path in &paths {
        match run_once(path, &config) {
            Ok((records, report)) => {
                if report.labeled_records == 0 {
                    eprintln!("Skipping {}: not enough anchors", path.display());
                }
                sessions.push(json!({
                    "file": path.display().to_string(),
                    "report": report,
                }));
                merged.extend(records);
            }
            Err(e) => eprintln!("Failed {}: {}", path.display(), e),
        }
    }

    let Some(origin) = unify_labels(&mut merged, config.scale_convention) else {
        anyhow::bail!("No usable labeled records in {}", args.data_dir.display());
    };
    save_records(&args.output, &merged)?;
    log::info!("Wrote {} labeled records to {}", merged.len(), args.output.display());

    let summary = json!({
        "files": paths.len(),
        "labeled_records": merged.len(),
        "global_origin": origin,
        "sessions": sessions,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
