use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use spectrum_view::coords::SharedViewport;
use spectrum_view::frame::{Carrier, SyntheticSource};
use spectrum_view::cell::ConstantCell;
use spectrum_view::render::gpu::{GpuProvider, HeadlessGpu};
use spectrum_view::render::{RenderOutput, select_backend};
use spectrum_view::storage::{JsonFileStore, Namespaced, NoPersistence, StoredView, ViewPersistence};
use spectrum_view::{
    DisplayConfig, DisplayInputs, FrameHub, FrameScheduler, LocalCell, SpectrumDisplay,
    SpectrumRenderer,
};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spectrum-view")]
#[command(about = "Live spectrum plot and waterfall display for SDR receivers")]
#[command(version = "0.1.0")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic session through the raster backend and save PNGs
    Render {
        /// Directory for plot.png and waterfall.png
        #[arg(long, default_value = ".")]
        output: PathBuf,

        /// Frames to generate
        #[arg(long, default_value = "300")]
        frames: usize,

        /// Image width in pixels
        #[arg(long, default_value = "1024")]
        width: u32,

        /// Image height in pixels (split between plot and waterfall)
        #[arg(long, default_value = "768")]
        height: u32,

        /// Bins per frame
        #[arg(long, default_value = "2048")]
        bins: usize,

        /// Initial center frequency in Hz
        #[arg(long, default_value = "100000000")]
        center: f64,

        /// Receiver bandwidth in Hz
        #[arg(long, default_value = "2000000")]
        bandwidth: f64,

        /// Retune by this many Hz every --retune-every frames
        #[arg(long, default_value = "50000")]
        retune_step: f64,

        /// Frames between retunes (0 = never)
        #[arg(long, default_value = "100")]
        retune_every: usize,

        /// Wheel delta applied before rendering (negative zooms in)
        #[arg(long, default_value = "0")]
        zoom: f64,

        /// Random seed for the synthetic noise
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Restore zoom and scroll from the previous run and save them afterwards
        #[arg(long)]
        remember_view: bool,
    },

    /// Report whether a GPU device can be obtained and which backend is used
    GpuInfo,

    /// Print the config file path and effective configuration
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<(PathBuf, DisplayConfig)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => DisplayConfig::default_path().context("Failed to locate config directory")?,
    };
    let config = DisplayConfig::load_from(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok((path, config))
}

struct Session {
    output: PathBuf,
    frames: usize,
    width: u32,
    height: u32,
    bins: usize,
    center: f64,
    bandwidth: f64,
    retune_step: f64,
    retune_every: usize,
    zoom: f64,
    seed: u64,
    remember_view: bool,
}

fn view_persistence(remember: bool) -> Result<Box<dyn ViewPersistence>> {
    if !remember {
        return Ok(Box::new(NoPersistence));
    }
    let store = JsonFileStore::open_default().context("Failed to open view state")?;
    tracing::debug!(path = %store.path().display(), "Using view state file");
    Ok(Box::new(StoredView::new(Namespaced::new(store, "render"))))
}

fn render(session: Session, config: DisplayConfig) -> Result<()> {
    if session.width == 0 || session.height == 0 || session.bins == 0 {
        return Err(anyhow!("width, height and bins must be positive"));
    }

    let center = LocalCell::new(session.center);
    let scheduler = Rc::new(FrameScheduler::new());
    let hub = Rc::new(FrameHub::new());

    let display = SpectrumDisplay::new(DisplayInputs {
        bandwidth: Rc::new(ConstantCell(session.bandwidth)),
        center_frequency: Rc::new(center.clone()),
        averaging: Rc::new(ConstantCell(config.averaging)),
        prefer_gpu: Rc::new(ConstantCell(false)),
        split_ratio: Rc::new(ConstantCell(config.split_ratio)),
        scheduler: scheduler.clone(),
        persistence: view_persistence(session.remember_view)?,
        frames: hub.clone(),
        viewport: Rc::new(SharedViewport::new(session.width, session.height)),
        gpu: None,
        config,
    });

    // Carriers sit at fixed absolute frequencies so retunes show up as drift
    let mut source = SyntheticSource::new(session.seed, session.center, session.bandwidth, session.bins)
        .with_carrier(Carrier {
            frequency: session.center - session.bandwidth * 0.2,
            level_db: -45.0,
            width: session.bandwidth / 400.0,
        })
        .with_carrier(Carrier {
            frequency: session.center + session.bandwidth * 0.1,
            level_db: -60.0,
            width: session.bandwidth / 100.0,
        });

    if session.zoom != 0.0 {
        hub.push(&source.next_frame());
        display.on_wheel(session.zoom, session.width as f64 / 2.0);
    }

    for i in 0..session.frames {
        if session.retune_every > 0 && i > 0 && i % session.retune_every == 0 {
            let frequency = source.center_frequency() + session.retune_step;
            source.tune(frequency);
            center.set(frequency);
            tracing::debug!(frame = i, frequency, "Retuned");
        }
        hub.push(&source.next_frame());
        scheduler.run_frame();
    }
    // Settle deferred recomputes and the redraw they schedule
    while scheduler.run_frame() > 0 {}

    std::fs::create_dir_all(&session.output)
        .with_context(|| format!("Failed to create {}", session.output.display()))?;

    let plot_path = session.output.join("plot.png");
    match display.plot().output() {
        RenderOutput::Pixmap(pixmap) => pixmap
            .save_png(&plot_path)
            .with_context(|| format!("Failed to write {}", plot_path.display()))?,
        _ => return Err(anyhow!("Plot produced no image")),
    }

    let waterfall_path = session.output.join("waterfall.png");
    match display.waterfall().output() {
        RenderOutput::Pixmap(pixmap) => pixmap
            .save_png(&waterfall_path)
            .with_context(|| format!("Failed to write {}", waterfall_path.display()))?,
        _ => return Err(anyhow!("Waterfall produced no image")),
    }

    println!("Zoom: {:.3}", display.coords().zoom());
    println!("Wrote {}", plot_path.display());
    println!("Wrote {}", waterfall_path.display());
    display.dispose();
    Ok(())
}

fn gpu_info(config: &DisplayConfig) {
    let context = HeadlessGpu.acquire();
    let available = context.is_some();

    match &context {
        Some(context) => {
            println!("GPU: available");
            println!("Texel encoding: {:?}", context.encoding());
            println!("Max texture dimension: {}", context.max_texture_dimension());
        }
        None => println!("GPU: unavailable"),
    }
    println!("Prefer GPU: {}", config.prefer_gpu);
    println!("Backend: {}", select_backend(config.prefer_gpu, available));
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (config_path, config) = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            output,
            frames,
            width,
            height,
            bins,
            center,
            bandwidth,
            retune_step,
            retune_every,
            zoom,
            seed,
            remember_view,
        } => render(
            Session {
                output,
                frames,
                width,
                height,
                bins,
                center,
                bandwidth,
                retune_step,
                retune_every,
                zoom,
                seed,
                remember_view,
            },
            config,
        ),

        Commands::GpuInfo => {
            gpu_info(&config);
            Ok(())
        }

        Commands::Config => {
            println!("Config file: {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
