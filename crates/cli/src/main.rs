//! CLI entry point for the batch encoder.
//!
//! Analyses the given files and directories, selects everything found and
//! encodes it in one batch, logging progress as the engine reports it.

use batch_encoder::{
    compatible_codecs, run_status_server, Config, ControllerError, EncodingController,
    EventDispatcher, EventHub, FfmpegEngine, JobRegistry, JobStatus, OptionsDraft, QualityMode,
    SharedRegistry,
};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Batch Encoder - encode many video files with ffmpeg in one go
#[derive(Parser, Debug)]
#[command(name = "batch-encode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Files or directories to encode (directories are searched recursively)
    #[arg(required_unless_present = "list_codecs")]
    paths: Vec<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long, default_value = "batch-encoder.toml")]
    config: PathBuf,

    /// Output container format (mp4, webm)
    #[arg(short, long)]
    format: Option<String>,

    /// Video codec (e.g. h264, hevc_nvenc, vp9)
    #[arg(long)]
    codec: Option<String>,

    /// Constant rate factor; defaults to the codec's value
    #[arg(long, conflicts_with = "bitrate")]
    crf: Option<u32>,

    /// Target video bitrate in kbit/s (switches to bitrate mode)
    #[arg(long)]
    bitrate: Option<u32>,

    /// Two-pass encoding (bitrate mode only)
    #[arg(long, requires = "bitrate")]
    two_pass: bool,

    /// Scale output to WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Directory for encoded files (defaults to each input's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output file name prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Output file name postfix
    #[arg(long)]
    postfix: Option<String>,

    /// Serve GET /jobs while encoding
    #[arg(long)]
    status_server: bool,

    /// Print the codecs this machine can use and exit
    #[arg(long)]
    list_codecs: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width = w.trim().parse().map_err(|_| format!("invalid width '{}'", w))?;
    let height = h.trim().parse().map_err(|_| format!("invalid height '{}'", h))?;
    Ok((width, height))
}

fn load_config(path: &PathBuf) -> Result<Config, String> {
    if path.exists() {
        Config::load(path).map_err(|e| format!("failed to load {}: {}", path.display(), e))
    } else {
        info!("{} not found, using defaults", path.display());
        Ok(Config::from_env())
    }
}

fn apply_args(draft: &mut OptionsDraft, args: &Args) {
    if let Some(codec) = &args.codec {
        draft.set_codec(codec);
    }
    if let Some(crf) = args.crf {
        draft.quality_mode = QualityMode::Crf;
        draft.crf_value = crf;
    }
    if let Some(kbps) = args.bitrate {
        draft.quality_mode = QualityMode::Bitrate;
        draft.bitrate_kbps = kbps;
    }
    draft.two_pass = args.two_pass;
    if let Some((width, height)) = args.resize {
        draft.resize = true;
        draft.width = width;
        draft.height = height;
    }
    if let Some(dir) = &args.output_dir {
        draft.output_dir = Some(dir.clone());
    }
    if let Some(prefix) = &args.prefix {
        draft.prefix = prefix.clone();
    }
    if let Some(postfix) = &args.postfix {
        draft.postfix = postfix.clone();
    }
}

async fn log_progress(registry: SharedRegistry) {
    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let mut last = -1.0;
    loop {
        ticker.tick().await;
        let overall = registry.read().await.overall_progress();
        if (overall - last).abs() >= 0.1 {
            info!("overall progress: {:.1}%", overall);
            last = overall;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let hub = EventHub::new();
    let registry = JobRegistry::shared();
    let engine = Arc::new(FfmpegEngine::new(&config.engine, hub.clone()));
    let dispatcher = match EventDispatcher::start(hub, registry.clone(), Arc::clone(&engine)) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("failed to start event dispatcher: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let controller =
        EncodingController::new(engine, registry.clone(), dispatcher.routing_watch());

    let codecs = match controller.available_codecs().await {
        Ok(codecs) => codecs,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.list_codecs {
        for codec in &codecs {
            println!(
                "{:<20} {:<30} {:<8} {}",
                codec.name,
                codec.display_name,
                codec.hardware_class,
                codec.compatible_formats.join(",")
            );
        }
        dispatcher.shutdown().await;
        return ExitCode::SUCCESS;
    }

    let mut draft = OptionsDraft::from_defaults(&config.encoding);
    let format = args.format.clone().unwrap_or_else(|| draft.video_format.clone());
    if draft.set_format(&format, &codecs).is_none() {
        warn!("no available codec supports {}", format);
    }
    apply_args(&mut draft, &args);
    let offered = compatible_codecs(&codecs, &draft.video_format);
    if !offered.iter().any(|c| c.name == draft.video_codec) {
        warn!(
            "{} is not among the codecs detected for {}",
            draft.video_codec, draft.video_format
        );
    }

    let server = if args.status_server || config.status_server.enabled {
        let bind = config.status_server.bind.clone();
        let registry = registry.clone();
        let flags = controller.flags();
        Some(tokio::spawn(async move {
            if let Err(e) = run_status_server(&bind, registry, flags).await {
                error!("{}", e);
            }
        }))
    } else {
        None
    };

    if let Err(e) = controller.request_discovery(args.paths.clone()).await {
        error!("{}", e);
        dispatcher.shutdown().await;
        return ExitCode::FAILURE;
    }
    dispatcher.wait_idle().await;

    let found = registry.read().await.len();
    if found == 0 {
        error!("no video files found");
        dispatcher.shutdown().await;
        return ExitCode::FAILURE;
    }
    info!("found {} video file(s)", found);

    let reporter = tokio::spawn(log_progress(registry.clone()));
    let result = controller.start_batch(&draft).await;
    dispatcher.wait_idle().await;
    reporter.abort();

    let mut failed = 0;
    {
        let registry = registry.read().await;
        for job in registry.jobs() {
            match job.status {
                JobStatus::Completed => info!("{}: completed", job.name),
                JobStatus::Failed => {
                    failed += 1;
                    error!(
                        "{}: failed ({})",
                        job.name,
                        job.error_reason.as_deref().unwrap_or("see log")
                    );
                }
                other => info!("{}: {}", job.name, other),
            }
        }
    }

    dispatcher.shutdown().await;
    if let Some(server) = server {
        server.abort();
    }

    match result {
        Ok(report) if failed == 0 => {
            info!("batch finished: {} file(s)", report.submitted);
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(ControllerError::BatchEncode { message, detail }) => {
            error!("{}: {}", message, detail);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_encoder::config::EncodingDefaults;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("640X480"), Ok((640, 480)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("widex720").is_err());
    }

    #[test]
    fn test_args_override_draft() {
        let args = Args::parse_from([
            "batch-encode",
            "--codec",
            "hevc",
            "--bitrate",
            "3000",
            "--two-pass",
            "--resize",
            "1920x1080",
            "--prefix",
            "",
            "/media",
        ]);
        let mut draft = OptionsDraft::from_defaults(&EncodingDefaults::default());
        apply_args(&mut draft, &args);

        assert_eq!(draft.video_codec, "hevc");
        assert_eq!(draft.quality_mode, QualityMode::Bitrate);
        assert_eq!(draft.bitrate_kbps, 3000);
        assert!(draft.two_pass);
        assert_eq!((draft.width, draft.height), (1920, 1080));
        assert!(draft.prefix.is_empty());
        assert_eq!(args.paths, vec![PathBuf::from("/media")]);
    }

    #[test]
    fn test_crf_and_bitrate_conflict() {
        assert!(Args::try_parse_from(["batch-encode", "--crf", "20", "--bitrate", "100", "a.mp4"]).is_err());
        assert!(Args::try_parse_from(["batch-encode", "--two-pass", "a.mp4"]).is_err());
    }

    #[test]
    fn test_paths_required_unless_listing() {
        assert!(Args::try_parse_from(["batch-encode"]).is_err());
        assert!(Args::try_parse_from(["batch-encode", "--list-codecs"]).is_ok());
    }
}
