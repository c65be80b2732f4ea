use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use simplelog::{Config, LevelFilter, WriteLogger};

use tensorviz::composite::ensure_planes;
use tensorviz::imageio::{load_png, read_f32_le, save_png, write_f32_le};
use tensorviz::panic_handler::initialize_panic_handler;
use tensorviz::settings::{self, ArgmaxStyle};
use tensorviz::{
    AlphaCompositor, ArgmaxColorMapper, ArgmaxPolicy, BackgroundColor, Bitmap, ScalarColorMapper,
    ScalarMode, TensorView, with_locked,
};

#[derive(Parser, Debug)]
#[command(name = "tensorviz", version, about = "Render model tensors and prepare model input")]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log file (overrides settings)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a [channels][height][width] f32 tensor as a segmentation map
    Argmax {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        channels: usize,
        #[arg(long)]
        height: usize,
        #[arg(long)]
        width: usize,
        /// palette, gradient or class-gray
        #[arg(long)]
        policy: Option<ArgmaxStyle>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Render the first plane of an f32 tensor as a heatmap
    Scalar {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        height: usize,
        #[arg(long)]
        width: usize,
        /// grayscale or gradient
        #[arg(long)]
        mode: Option<ScalarMode>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Flatten a PNG over a background into [3][height][width] f32 planes
    Composite {
        #[arg(long)]
        input: PathBuf,
        /// RRGGBB hex
        #[arg(long)]
        background: Option<BackgroundColor>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Normalize a PNG into [3][height][width] f32 planes
    Normalize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Turn normalized [3][height][width] f32 planes back into a PNG
    Denormalize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        height: usize,
        #[arg(long)]
        width: usize,
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The logger's own file and level come from settings, so problems found
    // while loading them are held until it is running.
    let loaded = settings::load_settings(cli.config.as_deref());
    let configured_level = settings::get_log_level();

    let log_file = cli.log_file.clone().unwrap_or_else(settings::get_log_file);
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        configured_level
            .as_ref()
            .copied()
            .unwrap_or(LevelFilter::Info)
    };
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&log_file)
            .with_context(|| format!("creating log file {}", log_file.display()))?,
    )?;
    initialize_panic_handler();

    if let Err(e) = loaded {
        error!("{e}");
    }
    if let Err(e) = configured_level {
        warn!("{e}");
    }
    info!("Starting tensorviz {:?}", cli.command);

    if let Err(err) = run(cli.command) {
        error!("Command failed: {err:?}");
        return Err(err);
    }

    info!("Done");
    Ok(())
}

fn run(command: Command) -> Result<()> {
    let threshold = settings::get_parallel_threshold();
    match command {
        Command::Argmax {
            input,
            channels,
            height,
            width,
            policy,
            output,
        } => {
            let data = read_f32_le(&input)?;
            let tensor = TensorView::new(&data, channels, height, width)?;
            let policy = match policy.unwrap_or_else(settings::get_argmax_style) {
                ArgmaxStyle::Palette => ArgmaxPolicy::Palette(settings::get_palette()),
                ArgmaxStyle::Gradient => ArgmaxPolicy::Gradient,
                ArgmaxStyle::ClassGray => ArgmaxPolicy::ClassGray,
            };
            let mapper = ArgmaxColorMapper::new(policy)
                .addressing(settings::get_row_addressing())
                .parallel_threshold(threshold);
            let mut bitmap = Bitmap::new(width, height)?;
            mapper.render(&tensor, &mut bitmap)?;
            write_png(&bitmap, &output)
        }
        Command::Scalar {
            input,
            height,
            width,
            mode,
            output,
        } => {
            let data = read_f32_le(&input)?;
            let tensor = TensorView::scalar(&data, height, width)?;
            let mapper = ScalarColorMapper::new(mode.unwrap_or_else(settings::get_scalar_mode))
                .parallel_threshold(threshold);
            let mut bitmap = Bitmap::new(width, height)?;
            mapper.render(&tensor, &mut bitmap)?;
            write_png(&bitmap, &output)
        }
        Command::Composite {
            input,
            background,
            output,
        } => {
            let mut bitmap = load_png(&input)?;
            let background = background.unwrap_or_else(settings::get_background);
            let mut planes = vec![0.0f32; 3 * bitmap.width() * bitmap.height()];
            AlphaCompositor::new(background)
                .parallel_threshold(threshold)
                .composite_surface(&mut bitmap, &mut planes)?;
            write_planes(&planes, &output)
        }
        Command::Normalize { input, output } => {
            let bitmap = load_png(&input)?;
            let mut planes = vec![0.0f32; 3 * bitmap.width() * bitmap.height()];
            settings::get_normalization().normalize_with(
                &bitmap.as_framebuffer()?,
                &mut planes,
                threshold,
            )?;
            write_planes(&planes, &output)
        }
        Command::Denormalize {
            input,
            height,
            width,
            output,
        } => {
            let planes = read_f32_le(&input)?;
            ensure_planes(planes.len(), width, height)?;
            let normalization = settings::get_normalization();
            let mut bitmap = Bitmap::new(width, height)?;
            with_locked(&mut bitmap, |mut fb| {
                normalization.denormalize_with(&planes, &mut fb, threshold)
            })?;
            write_png(&bitmap, &output)
        }
    }
}

fn write_png(bitmap: &Bitmap, output: &Path) -> Result<()> {
    save_png(bitmap, output)?;
    info!(
        "Wrote {}x{} image to {}",
        bitmap.width(),
        bitmap.height(),
        output.display()
    );
    println!("{}", output.display());
    Ok(())
}

fn write_planes(planes: &[f32], output: &Path) -> Result<()> {
    write_f32_le(output, planes)?;
    info!("Wrote {} floats to {}", planes.len(), output.display());
    println!("{}", output.display());
    Ok(())
}
