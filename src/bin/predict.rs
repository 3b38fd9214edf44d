#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use burn::backend::Wgpu;
use clap::Parser;
use log::info;

use ocr_eval::config::AppConfig;
use ocr_eval::crnn::{CrnnRecognizer, LabelConverter};
use ocr_eval::predict::Predictor;

type InferBackend = Wgpu<f32, i32>;

/// Recognize text in every image of a directory and append results to a CSV file.
#[derive(Parser)]
#[command(name = "predict", about = "Run CRNN text recognition over a directory of images")]
struct Cli {
    /// Directory searched recursively for images
    #[arg(long, alias = "test_data_path")]
    test_data_path: Option<PathBuf>,

    /// Directory the result CSV is written to
    #[arg(long, alias = "output_path")]
    output_path: Option<PathBuf>,

    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the trained model record file
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Override the alphabet file
    #[arg(long)]
    alphabet: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .filter(Some("ocr_eval"), log::LevelFilter::Debug)
        .init();

    let cli = Cli::parse();

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(path) = cli.test_data_path {
        app_config.predict.test_data_path = path;
    }
    if let Some(path) = cli.output_path {
        app_config.predict.output_path = path;
    }
    if let Some(path) = cli.model_path {
        app_config.crnn.model_path = path;
    }
    if cli.alphabet.is_some() {
        app_config.crnn.alphabet_path = cli.alphabet;
    }
    app_config.validate().context("invalid configuration")?;

    let converter: LabelConverter = app_config
        .crnn
        .converter()
        .context("loading alphabet")?;
    info!(
        "Loading pretrained model from {}",
        app_config.crnn.model_path.display()
    );
    let recognizer = CrnnRecognizer::<InferBackend>::load(
        &app_config.crnn.model_path,
        converter,
        &app_config.crnn,
        WgpuDevice::default(),
    )
    .with_context(|| format!("loading model from {}", app_config.crnn.model_path.display()))?;

    let mut predictor = Predictor::new(recognizer, app_config.predict.clone());
    let stats = predictor.run().context("prediction failed")?;
    println!(
        "{} images recognized, {} skipped, elapsed time: {:.3}s",
        stats.recognized,
        stats.skipped,
        stats.elapsed.as_secs_f64()
    );

    Ok(())
}
