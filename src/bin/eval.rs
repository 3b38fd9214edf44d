#![recursion_limit = "256"]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::backend::wgpu::WgpuDevice;
use burn::backend::Wgpu;
use clap::Parser;
use log::info;

use ocr_eval::config::AppConfig;
use ocr_eval::crnn::CrnnEvalModel;
use ocr_eval::eval::CheckpointEvaluator;
use ocr_eval::recognition::{RecognitionAggregator, VisualizingBatchProcessor};

type InferBackend = Wgpu<f32, i32>;

/// Evaluate CRNN checkpoints as they appear in a training directory.
#[derive(Parser)]
#[command(name = "eval", about = "Evaluate text-recognition checkpoints")]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the watched checkpoint directory
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,

    /// Override the directory metrics are written to
    #[arg(long)]
    summary_dir: Option<PathBuf>,

    /// Override the labeled evaluation data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override seconds between checkpoint polls
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Stop after this many polling iterations
    #[arg(long)]
    max_evaluations: Option<usize>,

    /// Evaluate the latest checkpoint once and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .filter(Some("ocr_eval"), log::LevelFilter::Debug)
        .init();

    let cli = Cli::parse();

    if cli.max_evaluations == Some(0) {
        bail!("--max-evaluations must be at least 1");
    }

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    // Apply CLI overrides
    if let Some(dir) = cli.checkpoint_dir {
        app_config.eval.checkpoint_dirs = vec![dir];
    }
    if let Some(dir) = cli.summary_dir {
        app_config.eval.summary_dir = dir;
    }
    if let Some(dir) = cli.data_dir {
        app_config.dataset.data_dir = dir;
    }
    if let Some(secs) = cli.interval_secs {
        app_config.eval.eval_interval_secs = secs;
    }
    if cli.max_evaluations.is_some() {
        app_config.eval.max_evaluations = cli.max_evaluations;
    }
    app_config.validate().context("invalid configuration")?;

    let device = WgpuDevice::default();
    let model = CrnnEvalModel::<InferBackend>::new(
        app_config.crnn.clone(),
        &app_config.dataset,
        device,
    )
    .context("building CRNN evaluation model")?;
    info!(
        "Evaluating up to {} of {} samples per checkpoint",
        app_config.eval.num_batches,
        model.num_samples()
    );

    let recognition = app_config.recognition.clone();
    let aggregator = RecognitionAggregator::new(recognition.clone());
    let mut evaluator = CheckpointEvaluator::new(app_config.eval.clone(), model, aggregator)
        .context("opening summary writer")?;
    match recognition.visualization_dir {
        Some(dir) if recognition.num_visualizations > 0 => {
            evaluator = evaluator.with_batch_processor(VisualizingBatchProcessor::new(
                dir,
                recognition.num_visualizations,
                recognition.only_visualize_incorrect,
            ));
        }
        _ => {}
    }

    if cli.once {
        let report = evaluator.run_once().context("evaluation pass failed")?;
        for (name, value) in &report.metrics {
            println!("{}: {}", name, value);
        }
    } else {
        let stats = evaluator.run_repeated().context("checkpoint polling failed")?;
        info!(
            "Finished after {} polling iterations ({} passes)",
            stats.iterations, stats.passes
        );
    }

    Ok(())
}
