//! Face Feature Extractor
//!
//! Extracts embeddings for a list of face images and writes one `.npy`
//! file per (image, layer).

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use facefeat::config::ExtractorConfig;
use facefeat::engine::{split_layer_names, FeatureExtractor};
use facefeat::storage::{FeatureStore, NpyFeatureStore};
use facefeat::utils::image::load_image_list;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Extractor config file (.json or .toml)
    #[arg(long, value_name = "FILE", default_value = "extractor_config.json")]
    config: PathBuf,

    /// Image list file, one path per line
    #[arg(long, value_name = "FILE")]
    image_list: PathBuf,

    /// Directory the listed image paths are relative to
    #[arg(long, value_name = "DIR")]
    image_root: Option<PathBuf>,

    /// Output directory for the .npy feature files
    #[arg(long, value_name = "DIR", default_value = "rlt_features")]
    save_dir: PathBuf,

    /// Comma separated output layers, overriding the config
    #[arg(long, value_name = "LAYERS")]
    layers: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    info!("Starting face feature extractor v{}", env!("CARGO_PKG_VERSION"));

    let config = ExtractorConfig::load(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    info!("Configuration loaded:");
    info!("  Model: {},{}", config.network_model.prefix, config.network_model.epoch);
    info!("  Batch size: {}", config.batch_size);
    info!("  Input: {}x{}", config.input_width, config.input_height);
    info!("  Mirror trick: {:?}", config.mirror_trick);
    info!("  Device: {}", config.device);

    let mut extractor = FeatureExtractor::new(config).context("failed to initialize extractor")?;

    if let Some(layers) = args.layers.as_deref() {
        let layers = split_layer_names(layers)?;
        extractor.set_feature_layers(&layers)?;
    }
    info!("Feature layers: {:?}", extractor.feature_layers());

    let image_list = load_image_list(&args.image_list)
        .with_context(|| format!("failed to read image list {}", args.image_list.display()))?;

    let start = Instant::now();
    let features = extractor.extract_features_for_image_list(&image_list, args.image_root.as_deref())?;
    let elapsed = start.elapsed();
    info!(
        "Extracted {} images in {:?} ({:.2} ms/image)",
        features.num_images(),
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / features.num_images().max(1) as f64
    );

    let mut store = NpyFeatureStore::new(&args.save_dir)?;
    let saved = store.save_all(&image_list, &features)?;
    info!("Saved {} feature files to {}", saved, store.root().display());

    Ok(())
}
