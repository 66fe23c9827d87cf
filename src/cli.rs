//
// cli.rs
// Dicom-Viewer-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::annotation::AnnotationKind;
use crate::config::ViewerConfig;
use crate::export::{self, RenderOptions, ShapeSpec};
use crate::render::Point;
use crate::{metadata, web};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-viewer")]
#[command(about = "DICOM viewport, windowing and annotation tools", long_about = None)]
pub struct Cli {
    /// JSON file with viewer settings (surface size, zoom factors, thresholds)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub surface_width: Option<u32>,
    #[arg(long, global = true)]
    pub surface_height: Option<u32>,
    /// Flip the wheel convention so scrolling down zooms in
    #[arg(long, global = true)]
    pub invert_wheel: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the viewer HTTP server
    Serve {
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
    /// Render a file or URL headlessly and save a PNG snapshot
    Render {
        /// Local path, http(s) URL, or wadouri: identifier
        source: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        frame: Option<u32>,
        #[arg(long)]
        zoom: Option<f64>,
        #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
        pan: Option<(f64, f64)>,
        #[arg(long)]
        invert: bool,
        #[arg(long, allow_hyphen_values = true)]
        window_center: Option<f64>,
        #[arg(long)]
        window_width: Option<f64>,
        /// Rectangle as x0,y0,x1,y1 in surface coordinates (repeatable)
        #[arg(long = "rect", value_parser = parse_rect)]
        rects: Vec<ShapeSpec>,
        /// Circle drag as x0,y0,x1,y1 in surface coordinates (repeatable)
        #[arg(long = "circle", value_parser = parse_circle)]
        circles: Vec<ShapeSpec>,
        /// Flatten annotations into the snapshot
        #[arg(long)]
        annotated: bool,
    },
    /// Print the image information panel
    Info {
        source: String,
        #[arg(long)]
        json: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    init_tracing();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { host, port } => web::start_server(&host, port, config).await?,
        Commands::Render {
            source,
            output,
            frame,
            zoom,
            pan,
            invert,
            window_center,
            window_width,
            rects,
            circles,
            annotated,
        } => {
            let window = parse_window(window_center, window_width)?;
            let options = RenderOptions {
                frame,
                zoom,
                pan,
                invert,
                window,
                shapes: rects.into_iter().chain(circles).collect(),
                annotated,
            };
            export::render_to_file(&source, output, &options, &config).await?;
        }
        Commands::Info { source, json } => metadata::print_info(&source, &config, json).await?,
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignore the error if a subscriber was already installed (e.g. by an embedding host).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(cli: &Cli) -> anyhow::Result<ViewerConfig> {
    let mut config = match &cli.config {
        Some(path) => ViewerConfig::from_file(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(width) = cli.surface_width {
        config.surface_width = width;
    }
    if let Some(height) = cli.surface_height {
        config.surface_height = height;
    }
    if cli.invert_wheel {
        config.invert_wheel = true;
    }
    Ok(config.sanitized())
}

fn parse_window(center: Option<f64>, width: Option<f64>) -> anyhow::Result<Option<(f64, f64)>> {
    // Window requires both center and width to make sense; reject mismatched input early.
    match (center, width) {
        (Some(c), Some(w)) => {
            if w < 1.0 {
                bail!("--window-width must be at least 1");
            }
            Ok(Some((w, c)))
        }
        (None, None) => Ok(None),
        _ => Err(anyhow!(
            "Provide both --window-center and --window-width, or neither"
        )),
    }
}

fn parse_numbers<const N: usize>(value: &str) -> anyhow::Result<[f64; N]> {
    let numbers = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid number in {:?}", value))?;
    numbers
        .try_into()
        .map_err(|_| anyhow!("Expected {} comma-separated numbers, got {:?}", N, value))
}

fn parse_pair(value: &str) -> anyhow::Result<(f64, f64)> {
    let [x, y] = parse_numbers::<2>(value)?;
    Ok((x, y))
}

fn parse_shape(kind: AnnotationKind, value: &str) -> anyhow::Result<ShapeSpec> {
    let [x0, y0, x1, y1] = parse_numbers::<4>(value)?;
    Ok(ShapeSpec {
        kind,
        start: Point::new(x0, y0),
        end: Point::new(x1, y1),
    })
}

fn parse_rect(value: &str) -> anyhow::Result<ShapeSpec> {
    parse_shape(AnnotationKind::Rectangle, value)
}

fn parse_circle(value: &str) -> anyhow::Result<ShapeSpec> {
    parse_shape(AnnotationKind::Circle, value)
}
