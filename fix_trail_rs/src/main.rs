use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant};

use fix_trail_rs::live_status::LiveStatus;
use fix_trail_rs::location_source;
use fix_trail_rs::storage::TrackExport;
use fix_trail_rs::track::display_speed_kmh;
use fix_trail_rs::types::{current_timestamp, Fix};
use fix_trail_rs::{FixPipeline, PipelineConfig, PipelineEvent, TrackSource};

#[derive(Parser, Debug)]
#[command(name = "fix_trail")]
#[command(about = "Live location fix filtering with speed-gradient track output", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Pipeline config (JSON); built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override smoother tick interval (seconds)
    #[arg(long)]
    tick: Option<f64>,

    /// Override smoother decay factor
    #[arg(long)]
    decay: Option<f64>,

    /// Track drawn in the export
    #[arg(long, value_enum)]
    source: Option<TrackSource>,

    /// Location polling period in milliseconds
    #[arg(long, default_value = "1000")]
    period_ms: u64,

    /// Read fixes from termux-location instead of the synthetic walk
    #[arg(long)]
    termux: bool,

    /// Output directory
    #[arg(long, default_value = "fix_trail_sessions")]
    output_dir: String,
}

fn load_config(args: &Args) -> Result<PipelineConfig> {
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
    if let Some(source) = args.source {
        config.track_source = source;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    println!("[{}] Fix Trail Starting", ts_now());
    println!("  Duration: {} seconds (0=continuous)", args.duration);
    println!(
        "  Smoother: tick {} s, decay {}",
        config.tick_interval_secs, config.decay_factor
    );
    println!(
        "  Gate: max age {} s, max accuracy {} m",
        config.max_fix_age_secs, config.max_horizontal_accuracy_m
    );
    println!("  Output Dir: {}", args.output_dir);

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir))?;

    let mut pipeline = FixPipeline::from_config(&config)?;
    let mapper = config.mapper()?;
    pipeline.register(Box::new(|event: &PipelineEvent| match event {
        PipelineEvent::Filtered { fix, smoother, .. } => {
            println!(
                "[{}] {} speed {}",
                ts_now(),
                smoother,
                display_speed_kmh(fix.speed)
            );
        }
        PipelineEvent::GateDecided { decision, .. } if !decision.is_accepted() => {
            println!("[{}] Fix dropped: {}", ts_now(), decision);
        }
        _ => {}
    }));

    // every producer funnels into this one channel; only this task touches the pipeline
    let (fix_tx, mut fix_rx) = mpsc::channel::<Vec<Fix>>(100);
    let _source_handle = tokio::spawn(location_source::fix_loop(
        fix_tx,
        Duration::from_millis(args.period_ms.max(1)),
        args.termux,
    ));

    let start = Instant::now();
    let mut status_tick = interval(Duration::from_secs(2));

    println!("[{}] Starting fix collection...", ts_now());

    loop {
        if args.duration > 0 && start.elapsed().as_secs() >= args.duration {
            println!("[{}] Duration reached, stopping...", ts_now());
            break;
        }

        tokio::select! {
            batch = fix_rx.recv() => {
                match batch {
                    Some(fixes) => {
                        pipeline.process_batch(fixes, current_timestamp());
                    }
                    None => {
                        log::warn!("Location source stopped");
                        break;
                    }
                }
            }
            _ = status_tick.tick() => {
                let status = LiveStatus::from_pipeline(&pipeline, start.elapsed().as_secs());
                let status_path = format!("{}/live_status.json", args.output_dir);
                if let Err(e) = status.save(&status_path) {
                    log::warn!("Failed to write {}: {}", status_path, e);
                }
            }
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
    let filename = format!("{}/track_{}_final.json", args.output_dir, ts_now_clean());
    std::fs::write(&filename, export.to_json()?)
        .with_context(|| format!("writing {}", filename))?;

    let gpx_name = format!("{}/track_{}.gpx", args.output_dir, ts_now_clean());
    std::fs::write(&gpx_name, export.to_gpx("Fix Trail").to_gpx_xml())
        .with_context(|| format!("writing {}", gpx_name))?;

    let final_status = LiveStatus::from_pipeline(&pipeline, start.elapsed().as_secs());
    let status_path = format!("{}/live_status_final.json", args.output_dir);
    if let Err(e) = final_status.save(&status_path) {
        log::warn!("Failed to write {}: {}", status_path, e);
    }

    let stats = pipeline.stats();
    println!("\n=== Final Stats ===");
    println!("Fixes received: {}", stats.received);
    println!("Fixes accepted: {}", stats.accepted);
    println!(
        "Rejected: {} stale, {} invalid, {} low accuracy",
        stats.rejected_stale, stats.rejected_invalid_accuracy, stats.rejected_low_accuracy
    );
    if let Some(fix) = pipeline.latest_filtered() {
        println!("Filtered speed: {}", display_speed_kmh(fix.speed));
    }
    println!("Saved {} and {}", filename, gpx_name);

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
