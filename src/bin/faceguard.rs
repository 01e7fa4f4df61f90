//! faceguard - face-mask detection client.
//!
//! - `scan`: upload one image, print (and optionally draw) the detections
//! - `live`: sample a camera once per interval and print each fresh result
//! - `history`: list past scans kept by the detection service

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use faceguard::history::HistoryFeed;
use faceguard::live::{LiveConfig, LiveController, LiveEvent};
use faceguard::ui::{Ui, UiMode};
use faceguard::{
    annotate, camera_provider, render_detections, render_history, CaptureError, DetectionResult,
    FaceguardConfig, HistoryQuery, HttpInferenceClient, InferenceFailure, ScanError, Scanner,
    SharedDetectionStore,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "faceguard", version, about = "Face-mask detection client")]
struct Args {
    /// Detection service base URL
    #[arg(long, env = "FACEGUARD_API_URL")]
    api_url: Option<String>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload an image and show its detections (kept in history)
    Scan {
        /// Image to scan (JPEG or PNG)
        image: PathBuf,
        /// Write a copy of the image with boxes drawn on it
        #[arg(long, value_name = "OUT")]
        annotate: Option<PathBuf>,
    },
    /// Stream camera frames for detection (never kept in history)
    Live {
        /// Camera URL (stub://name?size=WxH or http(s)://...)
        #[arg(long, env = "FACEGUARD_CAMERA_URL")]
        camera: Option<String>,
        /// Milliseconds between samples
        #[arg(long, env = "FACEGUARD_SAMPLE_INTERVAL_MS")]
        interval_ms: Option<u64>,
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// List past scans
    History {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, env = "FACEGUARD_HISTORY_LIMIT")]
        limit: Option<u32>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::new(UiMode::from_flag(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = FaceguardConfig::load_unvalidated()?;
    if let Some(url) = args.api_url {
        cfg.api_url = url;
    }

    if let Command::Live {
        camera,
        interval_ms,
        ..
    } = &args.command
    {
        if let Some(camera) = camera {
            cfg.camera.url = camera.clone();
        }
        if let Some(ms) = interval_ms {
            cfg.camera.sample_interval = Duration::from_millis(*ms);
        }
    }
    cfg.validate()?;

    match args.command {
        Command::Scan { image, annotate } => run_scan(&cfg, &ui, &image, annotate.as_deref()),
        Command::Live { duration_secs, .. } => {
            run_live(&cfg, duration_secs.map(Duration::from_secs))
        }
        Command::History { skip, limit } => {
            let query = HistoryQuery {
                skip,
                limit: limit.unwrap_or(cfg.history_limit),
            };
            run_history(&cfg, &ui, query)
        }
    }
}

fn build_client(cfg: &FaceguardConfig) -> Result<HttpInferenceClient> {
    HttpInferenceClient::new(&cfg.api_url, cfg.request_timeout)
}

fn run_scan(
    cfg: &FaceguardConfig,
    ui: &Ui,
    path: &std::path::Path,
    annotate_out: Option<&std::path::Path>,
) -> Result<()> {
    let client = build_client(cfg)?;
    let scanner = Scanner::new(Arc::new(client), SharedDetectionStore::new());
    let image = scanner
        .select(path)
        .with_context(|| format!("could not load {}", path.display()))?;

    let outcome = {
        let mut busy = ui.busy(&format!("Scanning {}", image.filename()));
        let outcome = scanner.scan(&image);
        if outcome.is_err() {
            busy.failed();
        }
        outcome
    };
    let result = outcome.map_err(|err| explain_scan_error(err, &cfg.api_url))?;

    println!(
        "scan {} of {} ({})",
        result.id(),
        image.filename(),
        result.source()
    );
    print_overlay(&result);

    if let Some(out) = annotate_out {
        let mut rgb = image
            .to_rgb()
            .with_context(|| format!("could not decode {}", image.filename()))?;
        let drawn = annotate(&mut rgb, &result);
        rgb.save(out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        println!("wrote {} ({} boxes)", out.display(), drawn);
    }
    Ok(())
}

fn run_live(cfg: &FaceguardConfig, duration: Option<Duration>) -> Result<()> {
    let client = build_client(cfg)?;
    let provider = camera_provider(&cfg.camera.url, cfg.request_timeout)
        .map_err(|err| explain_capture_error(err, &cfg.camera.url))?;

    let (events_tx, events_rx) = mpsc::channel();
    let mut controller = LiveController::new(
        provider,
        Arc::new(client),
        SharedDetectionStore::new(),
        LiveConfig {
            sample_interval: cfg.camera.sample_interval,
            max_in_flight: cfg.camera.max_in_flight,
        },
    )
    .with_events(events_tx);

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    controller
        .start()
        .map_err(|err| explain_capture_error(err, &cfg.camera.url))?;
    log::info!("live mode running; press Ctrl-C to stop");

    let started = Instant::now();
    let mut last_stats = Instant::now();
    let mut fault = None;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            log::info!("shutdown signal received");
            break;
        }
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        match events_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(LiveEvent::Started { camera }) => println!("camera on: {}", camera),
            Ok(LiveEvent::Detection(result)) => {
                println!("frame {}", result.source());
                print_overlay(&result);
            }
            Ok(LiveEvent::Stopped { reason }) => {
                fault = reason;
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        if last_stats.elapsed() >= STATS_INTERVAL {
            let stats = controller.stats();
            log::info!(
                "live: ticks={} dispatched={} accepted={} stale={} failed={} skipped_busy={} skipped_not_ready={}",
                stats.ticks,
                stats.dispatched,
                stats.accepted,
                stats.stale,
                stats.failed,
                stats.skipped_busy,
                stats.skipped_not_ready
            );
            last_stats = Instant::now();
        }
    }
    controller.stop();

    match fault {
        Some(reason) => Err(anyhow!("camera stopped: {}", reason)),
        None => Ok(()),
    }
}

fn run_history(cfg: &FaceguardConfig, ui: &Ui, query: HistoryQuery) -> Result<()> {
    let client = build_client(cfg)?;
    let entries = {
        let mut busy = ui.busy("Fetching history");
        let entries = client.fetch(query);
        if entries.is_err() {
            busy.failed();
        }
        entries
    };
    let entries = entries.map_err(|err| explain_inference_error(err, &cfg.api_url))?;
    println!("{}", render_history(&entries));
    Ok(())
}

fn print_overlay(result: &DetectionResult) {
    for line in render_detections(result).lines() {
        println!("  {}", line);
    }
}

fn explain_scan_error(err: ScanError, api_url: &str) -> anyhow::Error {
    match err {
        ScanError::Inference(err) => explain_inference_error(err, api_url),
        ScanError::Capture(err) => anyhow!("could not read image: {}", err),
        other => anyhow!(other),
    }
}

fn explain_inference_error(err: InferenceFailure, api_url: &str) -> anyhow::Error {
    match err {
        InferenceFailure::Network(_) | InferenceFailure::Timeout => anyhow!(
            "{}. Is the detection service running at {}? Set FACEGUARD_API_URL or --api-url.",
            err,
            api_url
        ),
        other => anyhow!(other),
    }
}

fn explain_capture_error(err: CaptureError, camera_url: &str) -> anyhow::Error {
    match err {
        CaptureError::PermissionDenied(_) => anyhow!(
            "{}. Grant access to {} and try again.",
            err,
            camera_url
        ),
        CaptureError::DeviceUnavailable(_) => anyhow!(
            "{}. Check that {} is connected and not in use.",
            err,
            camera_url
        ),
        other => anyhow!(other),
    }
}
