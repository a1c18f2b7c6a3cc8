//! FuriganaLens - command line tools for the annotation core
//!
//! Inspects coordinate mapping and brightness sampling, manages the local
//! reading dictionary and resolves readings through the configured tiers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use furigana_lens::config::{self, AppConfig};
use furigana_lens::furigana::{FuriganaResolver, HttpFuriganaClient, SqliteDictionary};
use furigana_lens::geometry::{rotated_dimensions, to_buffer_coords, to_upright_coords, BoundingBox};
use furigana_lens::storage;
use furigana_lens::vision::LuminanceSampler;
use furigana_lens::Frame;

/// FuriganaLens - live camera furigana annotation tools
#[derive(Parser, Debug)]
#[command(name = "furigana-lens")]
#[command(about = "Tools for the camera furigana annotation pipeline")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map a point between upright and sensor buffer coordinates
    Map {
        x: i32,
        y: i32,
        /// Sensor buffer width
        #[arg(long)]
        width: u32,
        /// Sensor buffer height
        #[arg(long)]
        height: u32,
        /// Rotation in degrees (0, 90, 180, 270)
        #[arg(long, default_value = "0")]
        rotation: i32,
        /// Map from buffer space back to upright space
        #[arg(long)]
        inverse: bool,
    },
    /// Sample background brightness of an image file
    Sample {
        image: PathBuf,
        /// Rotation in degrees (0, 90, 180, 270)
        #[arg(long, default_value = "0")]
        rotation: i32,
        /// Region in upright space as x,y,width,height (defaults to the frame center)
        #[arg(long, value_delimiter = ',', num_args = 4)]
        region: Option<Vec<i32>>,
    },
    /// Resolve readings for words
    Lookup {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Import word<TAB>reading[<TAB>rank] lines into the local dictionary
    Import { tsv: PathBuf },
    /// Print the effective configuration
    Config {
        /// Also write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_dir()?.join("config.toml"),
    };
    let config = load_or_default_config(&config_path);

    match args.command {
        Command::Map {
            x,
            y,
            width,
            height,
            rotation,
            inverse,
        } => {
            let (mx, my) = if inverse {
                to_upright_coords(x, y, width, height, rotation)?
            } else {
                to_buffer_coords(x, y, width, height, rotation)?
            };
            println!("({}, {}) -> ({}, {})", x, y, mx, my);
        }
        Command::Sample {
            image,
            rotation,
            region,
        } => run_sample(&config, &image, rotation, region.as_deref())?,
        Command::Lookup { words } => run_lookup(&config, words)?,
        Command::Import { tsv } => {
            let dictionary = SqliteDictionary::open(config.furigana.dictionary_path()?)?;
            let imported = dictionary.import_tsv(&tsv)?;
            println!("Imported {} readings ({} total)", imported, dictionary.len()?);
        }
        Command::Config { write } => {
            print!("{}", toml::to_string_pretty(&config)?);
            if write {
                config::save_config(&config, &config_path)?;
                info!("Saved configuration to {:?}", config_path);
            }
        }
    }

    Ok(())
}

/// Load configuration from file or fall back to defaults
fn load_or_default_config(path: &std::path::Path) -> AppConfig {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => tracing::warn!("Ignoring invalid configuration {:?}: {:#}", path, e),
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

fn run_sample(config: &AppConfig, path: &std::path::Path, rotation: i32, region: Option<&[i32]>) -> Result<()> {
    let luma = image::open(path)
        .with_context(|| format!("Failed to load image: {:?}", path))?
        .to_luma8();
    let (width, height) = luma.dimensions();
    let frame = Frame::from_luma(0, width, height, rotation, luma.into_raw());
    let plane = frame.luma().context("Frame has no luma plane")?;

    let sampler = LuminanceSampler::from_settings(&config.luminance);
    let value = match region {
        Some([x, y, w, h]) => sampler.sample_region(&plane, &BoundingBox::from_xywh(*x, *y, *w, *h), rotation),
        Some(other) => anyhow::bail!("Region needs 4 values, got {}", other.len()),
        None => sampler.sample_global_center(&plane, rotation),
    };

    let (uw, uh) = rotated_dimensions(width, height, rotation);
    match value {
        Some(v) => println!("luminance {} (upright canvas {}x{})", v, uw, uh),
        None => println!("no readable samples (upright canvas {}x{})", uw, uh),
    }
    Ok(())
}

fn run_lookup(config: &AppConfig, words: Vec<String>) -> Result<()> {
    let dictionary = SqliteDictionary::open(config.furigana.dictionary_path()?)?;
    let mut resolver = FuriganaResolver::new()
        .with_local(Arc::new(dictionary))
        .with_timeout(config.furigana.timeout());
    if let Some(endpoint) = &config.furigana.endpoint {
        let client = HttpFuriganaClient::new(endpoint.clone(), config.furigana.timeout())?;
        resolver = resolver.with_remote(Arc::new(client));
    }

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let readings = rt.block_on(resolver.resolve_batch(&words))?;

    for word in &words {
        match readings.get(word) {
            Some(reading) => println!("{}\t{}", word, reading.reading),
            None => println!("{}\t-", word),
        }
    }
    Ok(())
}
