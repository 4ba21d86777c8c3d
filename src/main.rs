//! Passport Photo CLI
//!
//! Command-line interface for running the photo pipeline: framing
//! analysis, uploads, print preparation and remote variation jobs.

use clap::{Parser, Subcommand, ValueEnum};
use passport_photo::{
    analysis::{FrameAnalyzer, FrameBuffer},
    capture::{
        prepare_upload_file, Camera, CaptureController, CaptureSource, CapturedImage, FileConfig,
        MockCamera, MockScene, StillCamera, STREAM_JPEG_QUALITY,
    },
    flow::{FlowCoordinator, JsonFileStore, StepEntry},
    job::{AuthToken, HttpGenerationService, JobOutcome, VariationJobClient},
    metrics::PipelineMetrics,
    postprocess::{read_density, AspectPostProcessor, DocumentType, PostProcessQueue},
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "passport-photo")]
#[command(about = "Capture, generate and print-prepare identity document photos")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run framing analysis on a still image
    Analyze { image: PathBuf },

    /// Crop, upscale and stamp an image for print
    Crop {
        input: PathBuf,
        #[arg(short, long)]
        document: DocumentType,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Downscale and re-encode a photo the way uploads are prepared
    Upload {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Submit a photo for variations and write the print-ready results
    Generate {
        photo: PathBuf,
        #[arg(short, long)]
        document: DocumentType,
        /// Bearer token for the generation service
        #[arg(long, env = "PASSPORT_PHOTO_TOKEN", hide_env_values = true)]
        token: String,
        /// Variation to select for delivery once results are in
        #[arg(long)]
        select: Option<u32>,
    },

    /// Watch the camera until framing passes, then capture
    Live {
        /// Use a synthetic scene instead of a device
        #[arg(long, value_enum)]
        mock: Option<SceneArg>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SceneArg {
    Face,
    Empty,
    NoSignal,
}

impl From<SceneArg> for MockScene {
    fn from(scene: SceneArg) -> Self {
        match scene {
            SceneArg::Face => MockScene::Face { coverage: 0.5 },
            SceneArg::Empty => MockScene::Empty,
            SceneArg::NoSignal => MockScene::NoSignal,
        }
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Passport Photo v{}", passport_photo::VERSION);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst)) {
            warn!("Failed to install Ctrl-C handler: {}", e);
        }
    }

    if let Err(e) = run(args, interrupted) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args, interrupted: Arc<AtomicBool>) -> CliResult {
    let config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };

    match args.command {
        Command::Analyze { image } => analyze(&image),
        Command::Crop {
            input,
            document,
            output,
        } => crop(&input, document, &output),
        Command::Upload { input, output } => upload(&input, output),
        Command::Generate {
            photo,
            document,
            token,
            select,
        } => runtime()?.block_on(generate(config, &photo, document, token, select, interrupted)),
        Command::Live {
            mock,
            output,
            timeout_secs,
        } => runtime()?.block_on(live(
            config,
            mock,
            output,
            Duration::from_secs(timeout_secs),
            interrupted,
        )),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn timestamped(prefix: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!(
        "{}-{}.{}",
        prefix,
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        extension
    ))
}

fn analyze(image: &Path) -> CliResult {
    let mut camera = StillCamera::from_path(image)?;
    camera.open(&Default::default())?;
    let frame = camera.capture()?;
    camera.close();

    let mut scratch = FrameBuffer::new();
    let report = FrameAnalyzer::report(Some(&frame), &mut scratch);
    info!(
        skin_ratio = ?report.skin_ratio,
        centroid = ?report.centroid,
        "Analyzed {}x{} frame",
        frame.width(),
        frame.height()
    );
    println!("{}", serde_json::to_string_pretty(&report.verdict)?);
    Ok(())
}

fn crop(input: &Path, document: DocumentType, output: &Path) -> CliResult {
    let source = std::fs::read(input)?;
    let processed = AspectPostProcessor::new().process_blocking(&source, document);
    std::fs::write(output, &processed)?;

    match read_density(&processed) {
        Ok(Some(density)) => info!(
            x_ppu = density.x_ppu,
            y_ppu = density.y_ppu,
            "Wrote print-ready {} to {}",
            document.label(),
            output.display()
        ),
        _ => info!("Wrote {} unchanged to {}", input.display(), output.display()),
    }
    Ok(())
}

fn upload(input: &Path, output: Option<PathBuf>) -> CliResult {
    let still = prepare_upload_file(input)?;
    let output = output.unwrap_or_else(|| timestamped("upload", "jpg"));
    std::fs::write(&output, still.bytes())?;
    info!(
        width = still.width(),
        height = still.height(),
        "Wrote {}",
        output.display()
    );
    Ok(())
}

fn start_metrics(config: &FileConfig) -> CliResult<Arc<PipelineMetrics>> {
    let metrics = Arc::new(PipelineMetrics::new()?);

    #[cfg(feature = "metrics")]
    if config.output.metrics_port != 0 {
        use passport_photo::metrics::{MetricsServer, MetricsServerConfig};
        let server = MetricsServer::new(
            MetricsServerConfig::with_port(config.output.metrics_port),
            Arc::clone(&metrics),
        );
        tokio::spawn(async move {
            if let Err(e) = server.run(std::future::pending()).await {
                warn!("Metrics server stopped: {}", e);
            }
        });
    }
    #[cfg(not(feature = "metrics"))]
    let _ = config;

    Ok(metrics)
}

async fn wait_for_interrupt(interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn generate(
    config: FileConfig,
    photo: &Path,
    document: DocumentType,
    token: String,
    select: Option<u32>,
    interrupted: Arc<AtomicBool>,
) -> CliResult {
    let token = AuthToken::new(token).ok_or("a bearer token is required")?;
    let metrics = start_metrics(&config)?;

    let mut flow = FlowCoordinator::resume(JsonFileStore::new(&config.output.flow_state_path))?;
    flow.start(false)?;
    flow.photo_captured(prepare_upload_file(photo)?)?;
    flow.choose_document(document)?;
    let input = match flow.enter_variations()? {
        StepEntry::Ready(input) => input,
        StepEntry::Redirect(step) => return Err(format!("flow redirected to {:?}", step).into()),
    };

    let service = Arc::new(HttpGenerationService::new(&config.job.endpoint)?);
    let client = VariationJobClient::new(service, config.job.clone())
        .with_metrics(Arc::clone(&metrics));
    let queue = PostProcessQueue::new(document).with_metrics(Arc::clone(&metrics));

    client.submit(
        input.photo.bytes().to_vec(),
        input.photo.mime_type(),
        document.photo_type(),
        config.job.include_shoulders,
        token,
    );

    let mut updates = client.subscribe();
    let mut tasks = Vec::new();
    loop {
        let snapshot = updates.borrow_and_update().clone();
        tasks.extend(queue.enqueue_all(snapshot.results.values()));
        if snapshot.status.is_terminal() {
            break;
        }
        info!(
            "{} of {} variations ({:.0}%)",
            snapshot.completed_count(),
            snapshot.total,
            snapshot.percent()
        );

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = wait_for_interrupt(&interrupted) => {
                warn!("Interrupted, cancelling job");
                client.cancel();
            }
        }
    }
    for task in tasks {
        task.await?;
    }

    match client.snapshot().outcome() {
        JobOutcome::Fatal { message, .. } => {
            return Err(format!("{} (run again to retry)", message).into())
        }
        JobOutcome::PartialSuccess { warning } => warn!("Partial results: {}", warning),
        JobOutcome::Completed | JobOutcome::InProgress => {}
    }

    std::fs::create_dir_all(&config.output.directory)?;
    for ready in queue.ready() {
        let path = config.output.directory.join(&ready.result.filename);
        std::fs::write(&path, &ready.result.image)?;
        let badge = ready
            .result
            .compliance
            .as_ref()
            .map(|c| format!("{} ({})", c.recommendation.badge_label(), c.issue_summary()))
            .unwrap_or_else(|| "no assessment".to_string());
        println!(
            "#{} {} [{}]",
            ready.variation_id(),
            path.display(),
            badge
        );
    }

    if let Some(id) = select {
        let chosen = queue
            .get(id)
            .ok_or_else(|| format!("variation {} is not available", id))?;
        flow.select_variation(chosen.result)?;
        info!("Selected variation {} for delivery", id);
    }
    Ok(())
}

fn demo_sample() -> CliResult<CapturedImage> {
    let mut camera = MockCamera::new();
    camera.open(&Default::default())?;
    let frame = camera.capture()?;
    camera.close();
    let image = frame.to_image().ok_or("demo frame is empty")?;
    Ok(CapturedImage::encode_jpeg(
        &image,
        STREAM_JPEG_QUALITY,
        CaptureSource::Sample,
    )?)
}

fn open_camera(mock: Option<SceneArg>) -> Box<dyn Camera> {
    match mock {
        Some(scene) => Box::new(MockCamera::with_scene(scene.into())),
        #[cfg(feature = "camera")]
        None => Box::new(passport_photo::capture::DeviceCamera::new()),
        #[cfg(not(feature = "camera"))]
        None => {
            warn!("Built without the `camera` feature, using a synthetic face");
            Box::new(MockCamera::new())
        }
    }
}

async fn live(
    config: FileConfig,
    mock: Option<SceneArg>,
    output: Option<PathBuf>,
    timeout: Duration,
    interrupted: Arc<AtomicBool>,
) -> CliResult {
    let metrics = start_metrics(&config)?;
    let mut controller = CaptureController::new(open_camera(mock), config.capture.clone())
        .with_metrics(metrics);
    if config.capture.demo_mode {
        controller = controller.with_demo_sample(demo_sample()?);
    }
    controller.start()?;

    let ready = tokio::select! {
        ready = controller.ready() => ready,
        _ = tokio::time::sleep(timeout) => false,
        _ = wait_for_interrupt(&interrupted) => false,
    };
    if !ready {
        controller.stop();
        return Err(format!(
            "framing did not pass (last verdict: {:?})",
            controller.verdict()
        )
        .into());
    }

    let still = controller.capture()?.clone();
    let output = output.unwrap_or_else(|| timestamped("capture", "jpg"));
    std::fs::write(&output, still.bytes())?;
    info!(
        width = still.width(),
        height = still.height(),
        "Wrote {}",
        output.display()
    );
    Ok(())
}
