use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use fix_trail_rs::storage::TrackExport;
use fix_trail_rs::track::display_speed_kmh;
use fix_trail_rs::{Fix, FixPipeline, PipelineConfig, PipelineEvent, Timestamp};

#[derive(Parser, Debug)]
struct Args {
    /// Path to fixes_*.json[.gz] log
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes fixes_*.json[.gz])
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Pipeline config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override smoother tick interval (seconds)
    #[arg(long)]
    tick: Option<f64>,

    /// Override smoother decay factor
    #[arg(long)]
    decay: Option<f64>,

    /// Write the styled track export next to each log
    #[arg(long, default_value_t = false)]
    export: bool,

    /// Also write a GPX file next to each log
    #[arg(long, default_value_t = false)]
    gpx: bool,
}

#[derive(Deserialize)]
struct LoggedFix {
    #[serde(flatten)]
    fix: Fix,
    /// Wall clock when the fix was delivered; defaults to the fix timestamp
    #[serde(default)]
    received_at: Option<Timestamp>,
}

#[derive(Deserialize)]
struct LogFile {
    fixes: Vec<LoggedFix>,
}

fn load_log(path: &Path) -> anyhow::Result<LogFile> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Consecutive fixes sharing a delivery time form one batch
fn delivery_batches(log: LogFile) -> Vec<(Timestamp, Vec<Fix>)> {
    let mut batches: Vec<(Timestamp, Vec<Fix>)> = Vec::new();
    for entry in log.fixes {
        let now = entry.received_at.unwrap_or(entry.fix.timestamp);
        match batches.last_mut() {
            Some((at, fixes)) if *at == now => fixes.push(entry.fix),
            _ => batches.push((now, vec![entry.fix])),
        }
    }
    batches
}

fn output_path(log: &Path, suffix: &str) -> PathBuf {
    let stem = log
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("fixes")
        .trim_end_matches(".gz")
        .trim_end_matches(".json");
    log.with_file_name(format!("{}{}", stem, suffix))
}

fn run_once(path: &Path, config: &PipelineConfig, args: &Args) -> anyhow::Result<serde_json::Value> {
    let log = load_log(path).with_context(|| format!("loading {}", path.display()))?;
    let mut pipeline = FixPipeline::from_config(config)?;
    let mapper = config.mapper()?;
    let events = pipeline.subscribe();

    let batches = delivery_batches(log);
    let batch_count = batches.len();
    for (now, fixes) in batches {
        pipeline.process_batch(fixes, now);
    }

    let mut reasons: BTreeMap<String, u64> = BTreeMap::new();
    let mut max_filtered_speed = 0.0f64;
    for event in events.try_iter() {
        match event {
            PipelineEvent::GateDecided { decision, .. } if !decision.is_accepted() => {
                *reasons.entry(decision.to_string()).or_insert(0) += 1;
            }
            PipelineEvent::Filtered { fix, .. } => {
                max_filtered_speed = max_filtered_speed.max(fix.speed);
            }
            _ => {}
        }
    }

    let export = TrackExport {
        generated_at: Utc::now().to_rfc3339(),
        source: config.track_source,
        stats: pipeline.stats(),
        raw: pipeline.track().raw().to_vec(),
        filtered: pipeline.track().filtered().to_vec(),
        styled: pipeline.style(&mapper, config.track_source),
        marker: pipeline.marker(),
    };

    if args.export {
        let out = output_path(path, "_track.json");
        std::fs::write(&out, export.to_json()?).with_context(|| format!("writing {}", out.display()))?;
        println!("[REPLAY] wrote {}", out.display());
    }
    if args.gpx {
        let out = output_path(path, ".gpx");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("replay");
        std::fs::write(&out, export.to_gpx(name).to_gpx_xml())
            .with_context(|| format!("writing {}", out.display()))?;
        println!("[REPLAY] wrote {}", out.display());
    }

    let stats = pipeline.stats();
    let final_speed = pipeline.latest_filtered().map(|f| f.speed).unwrap_or(0.0);
    Ok(json!({
        "log": path.display().to_string(),
        "batches": batch_count,
        "received": stats.received,
        "accepted": stats.accepted,
        "rejections": reasons,
        "segments": export.styled.segments.len(),
        "final_speed": final_speed,
        "final_speed_label": display_speed_kmh(final_speed),
        "max_filtered_speed": max_filtered_speed,
        "marker_radius": export.marker.map(|m| m.radius),
    }))
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(tick) = args.tick {
        config.tick_interval_secs = tick;
    }
    if let Some(decay) = args.decay {
        config.decay_factor = decay;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;
    let mut results = Vec::new();

    if let Some(dir) = args.log_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("fixes_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &config, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, &args)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
