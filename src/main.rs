use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use vmask::config::{self, Config};
use vmask::controls::{ControlPanel, ImageAssignment};
use vmask::display::Window;
use vmask::error::StartupError;
use vmask::render_loop::{run_preview, Pacer, RenderLoop};
use vmask::{Camera, Detector, RasterSurface};

#[derive(Parser)]
#[command(name = "vmask")]
#[command(
    version,
    about = "Live virtual mask - draws eyes, nose, mouth and a hat over detected faces"
)]
struct Cli {
    /// Config file (defaults to the user or system config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera and show the masked preview
    Run {
        /// Feature image as kind=path, e.g. hat=./hat.png (repeatable)
        #[arg(short, long = "image")]
        images: Vec<ImageAssignment>,
    },
    /// Apply the mask to a still image
    Render {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Feature image as kind=path (repeatable)
        #[arg(long = "image")]
        images: Vec<ImageAssignment>,
    },
    /// Write a config file with every default spelled out
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Open config file in editor
    Config,
}

fn main() -> ExitCode {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .init();

    match dispatch(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run { images } => {
            let cfg = config::load_config(config_path)?;
            run(&cfg, &images)
        }
        Commands::Render {
            input,
            output,
            images,
        } => {
            let cfg = config::load_config(config_path)?;
            render_still(&cfg, &images, &input, &output)
        }
        Commands::InitConfig { force } => init_config(config_path, force),
        Commands::Config => open_config(config_path),
    }
}

/// Control panel from the config, with configured and command-line images.
/// An image that fails to load is reported and skipped.
fn build_panel(cfg: &Config, images: &[ImageAssignment]) -> Result<ControlPanel> {
    let mut panel = ControlPanel::from_config(cfg)?;

    let configured = cfg
        .features()?
        .into_iter()
        .filter_map(|(kind, feature)| feature.image.clone().map(|path| (kind, path)));
    let requested = images.iter().map(|a| (a.kind, a.path.clone()));

    for (kind, path) in configured.chain(requested) {
        if let Err(e) = panel.upload(kind, Some(&path)) {
            warn!("{:#}", e);
        }
    }
    Ok(panel)
}

fn open_detector(cfg: &Config) -> Result<Detector, StartupError> {
    Detector::open(&cfg.model, cfg.score_threshold, cfg.nms_threshold)
        .map_err(|e| StartupError::detector(&cfg.model, e))
}

fn run(cfg: &Config, images: &[ImageAssignment]) -> Result<()> {
    info!("Opening camera: {}", cfg.camera);
    let mut camera =
        Camera::open(&cfg.camera).map_err(|e| StartupError::camera(&cfg.camera, e))?;

    info!("Loading face detector: {}", cfg.model.display());
    let detector = open_detector(cfg)?;

    let mut panel = build_panel(cfg, images)?;
    let (width, height) = camera.resolution();
    let mut window = Window::open(width, height, &panel)?;
    let mut render_loop = RenderLoop::new(detector, cfg.smoothing_threshold);
    let mut pacer = Pacer::new(Duration::from_millis(cfg.detection_interval_ms));

    info!("Camera opened ({}x{}). Press Esc to quit.", width, height);

    run_preview(
        &mut camera,
        &mut render_loop,
        &mut window,
        &mut panel,
        &mut pacer,
    )?;

    info!("Stopped after {} tick(s)", render_loop.ticks());
    Ok(())
}

fn render_still(
    cfg: &Config,
    images: &[ImageAssignment],
    input: &Path,
    output: &Path,
) -> Result<()> {
    let mut frame = image::open(input)
        .with_context(|| format!("reading {}", input.display()))?
        .to_rgb8();
    let detector = open_detector(cfg)?;
    let panel = build_panel(cfg, images)?;

    let (width, height) = frame.dimensions();
    let mut overlay = RasterSurface::new(width, height);
    let mut render_loop = RenderLoop::new(detector, 0.0);
    let report = render_loop.compose(&mut frame, &mut overlay, &panel.snapshot())?;

    if report.detection_failed {
        anyhow::bail!("Face detection failed on {}", input.display());
    }
    info!(
        "{} face(s), {} feature(s) drawn",
        report.faces, report.drawn
    );

    frame
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!("✓ Saved {}", output.display());
    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let target = path.unwrap_or(&config::CONFIG_PATH);
    if target.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            target.display()
        );
    }
    config::save_config(&Config::default(), Some(target))
        .with_context(|| format!("writing {}", target.display()))?;
    info!("✓ Wrote {}", target.display());
    Ok(())
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
