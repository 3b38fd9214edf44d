use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::checkpoint::{latest_checkpoint, CheckpointPointer};
use crate::error::{BatchError, CheckpointError, EvalError};
use crate::eval::results::{BatchCounters, MetricSet, ResultAccumulator};
use crate::eval::session::{
    BatchProcessor, DefaultBatchProcessor, EvalModel, EvalSession, FeederGuard, ResultAggregator,
    Restorer,
};
use crate::summary::{self, JsonlSummaryWriter, SummarySink};

/// File name of the exported graph description.
pub const GRAPH_FILE: &str = "eval.pbtxt";

/// Configuration for the checkpoint evaluation loop.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Watched checkpoint directories; only the first is polled and restored from.
    pub checkpoint_dirs: Vec<PathBuf>,
    pub summary_dir: PathBuf,
    pub num_batches: usize,
    pub eval_interval_secs: u64,
    /// Number of polling iterations before stopping; unset runs forever.
    pub max_evaluations: Option<usize>,
    pub save_graph: bool,
    pub save_graph_dir: Option<PathBuf>,
    /// Fields evaluated per batch but not kept for aggregation.
    pub keys_to_exclude_from_results: Vec<String>,
    pub log_every_n_batches: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            checkpoint_dirs: vec![PathBuf::from("checkpoints")],
            summary_dir: PathBuf::from("eval_summaries"),
            num_batches: 1,
            eval_interval_secs: 120,
            max_evaluations: None,
            save_graph: false,
            save_graph_dir: None,
            keys_to_exclude_from_results: vec![
                "original_image".to_string(),
                "rectified_image".to_string(),
            ],
            log_every_n_batches: 100,
        }
    }
}

impl EvalConfig {
    fn graph_output_dir(&self) -> Result<Option<&Path>, EvalError> {
        match (self.save_graph, self.save_graph_dir.as_deref()) {
            (false, _) => Ok(None),
            (true, Some(dir)) if !dir.as_os_str().is_empty() => Ok(Some(dir)),
            (true, _) => Err(EvalError::Config(
                "`save_graph_dir` must be defined when `save_graph` is set".into(),
            )),
        }
    }

    fn primary_checkpoint_dir(&self) -> Result<&Path, EvalError> {
        self.checkpoint_dirs
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                EvalError::Config("`checkpoint_dirs` must have at least one entry".into())
            })
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub checkpoint: Option<PathBuf>,
    pub global_step: u64,
    pub metrics: MetricSet,
    pub counters: BatchCounters,
    /// True when the input stream ran out before `num_batches`.
    pub exhausted: bool,
}

/// Counts from a repeated polling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub iterations: usize,
    pub passes: usize,
}

/// Polls a checkpoint directory and evaluates each new checkpoint.
pub struct CheckpointEvaluator<M: EvalModel> {
    config: EvalConfig,
    model: M,
    aggregator: Box<dyn ResultAggregator>,
    sink: Box<dyn SummarySink>,
    batch_processor: Option<Box<dyn BatchProcessor<M::Session>>>,
    restorer: Option<Box<dyn Restorer<M::Session>>>,
    last_report: Option<EvaluationReport>,
}

impl<M: EvalModel> CheckpointEvaluator<M> {
    /// Create an evaluator writing metrics to a JSON-lines file in `config.summary_dir`.
    pub fn new(
        config: EvalConfig,
        model: M,
        aggregator: impl ResultAggregator + 'static,
    ) -> Result<Self, EvalError> {
        let sink = JsonlSummaryWriter::new(&config.summary_dir)?;
        Ok(Self::with_sink(config, model, aggregator, sink))
    }

    pub fn with_sink(
        config: EvalConfig,
        model: M,
        aggregator: impl ResultAggregator + 'static,
        sink: impl SummarySink + 'static,
    ) -> Self {
        CheckpointEvaluator {
            config,
            model,
            aggregator: Box::new(aggregator),
            sink: Box::new(sink),
            batch_processor: None,
            restorer: None,
            last_report: None,
        }
    }

    /// Replace the default per-batch processing.
    pub fn with_batch_processor(
        mut self,
        processor: impl BatchProcessor<M::Session> + 'static,
    ) -> Self {
        self.batch_processor = Some(Box::new(processor));
        self
    }

    /// Restore sessions with `restorer` instead of the latest checkpoint.
    pub fn with_restorer(mut self, restorer: impl Restorer<M::Session> + 'static) -> Self {
        self.restorer = Some(Box::new(restorer));
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn last_report(&self) -> Option<&EvaluationReport> {
        self.last_report.as_ref()
    }

    /// Run a single evaluation pass against the latest checkpoint.
    pub fn run_once(&mut self) -> Result<EvaluationReport, EvalError> {
        self.run_pass(None)
    }

    /// Evaluate every new checkpoint until `max_evaluations` polling iterations
    /// have elapsed, or forever if unset.
    pub fn run_repeated(&mut self) -> Result<RunStats, EvalError> {
        if self.config.max_evaluations == Some(0) {
            return Err(EvalError::Config(
                "`max_evaluations` must be either unset or a positive number".into(),
            ));
        }
        let checkpoint_dir = self.config.primary_checkpoint_dir()?.to_path_buf();
        let interval = Duration::from_secs(self.config.eval_interval_secs);

        let mut last_evaluated: Option<CheckpointPointer> = None;
        let mut stats = RunStats::default();
        loop {
            let start = Instant::now();
            info!("Starting evaluation at {}s since epoch", unix_secs());

            match latest_checkpoint(&checkpoint_dir)? {
                None => info!(
                    "No model found in {}. Will try again in {} seconds",
                    checkpoint_dir.display(),
                    self.config.eval_interval_secs
                ),
                Some(pointer) if last_evaluated.as_ref() == Some(&pointer) => info!(
                    "Found already evaluated checkpoint. Will try again in {} seconds",
                    self.config.eval_interval_secs
                ),
                Some(pointer) => {
                    last_evaluated = Some(pointer.clone());
                    self.run_pass(Some(pointer.path()))?;
                    stats.passes += 1;
                }
            }
            stats.iterations += 1;

            if let Some(max) = self.config.max_evaluations {
                if stats.iterations >= max {
                    info!("Finished evaluation!");
                    break;
                }
            }

            if let Some(remaining) = remaining_interval(interval, start.elapsed()) {
                thread::sleep(remaining);
            }
        }
        Ok(stats)
    }

    fn run_pass(&mut self, checkpoint: Option<&Path>) -> Result<EvaluationReport, EvalError> {
        let graph_dir = self.config.graph_output_dir()?.map(Path::to_path_buf);
        let restore_from = match &self.restorer {
            Some(_) => checkpoint.map(Path::to_path_buf),
            None => Some(self.resolve_checkpoint(checkpoint)?),
        };

        let mut session = self.model.open_session()?;
        match (&self.restorer, &restore_from) {
            (Some(restorer), _) => restorer.restore(&mut session)?,
            (None, Some(path)) => {
                info!("Restoring parameters from {}", path.display());
                session.restore(path)?;
            }
            (None, None) => {}
        }

        if let Some(dir) = graph_dir {
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(GRAPH_FILE), session.graph_def())?;
        }

        let valid_keys: Vec<String> = session
            .result_keys()
            .into_iter()
            .filter(|k| !self.config.keys_to_exclude_from_results.contains(k))
            .collect();
        let mut results = ResultAccumulator::with_keys(valid_keys);
        let mut counters = BatchCounters::default();
        let mut supplementary = None;
        let mut supplementary_error = None;
        let mut exhausted = false;

        {
            let mut feeders = FeederGuard::start(&mut session);
            let num_batches = self.config.num_batches;
            let log_every = self.config.log_every_n_batches.max(1);
            for batch in 0..num_batches {
                if (batch + 1) % log_every == 0 {
                    info!("Running eval ops batch {}/{}", batch + 1, num_batches);
                }
                let outcome = match self.batch_processor.as_mut() {
                    Some(processor) => processor.process(&mut *feeders, batch, &mut counters),
                    None => DefaultBatchProcessor.process(&mut *feeders, batch, &mut counters),
                };
                match outcome {
                    Ok(result) => {
                        results.append(result);
                    }
                    Err(BatchError::InvalidInput(reason)) => {
                        warn!("Batch {} produced no result: {}", batch, reason);
                    }
                    Err(BatchError::Exhausted) => {
                        info!("Done evaluating -- input stream exhausted");
                        exhausted = true;
                        break;
                    }
                }
            }
            if !exhausted {
                match feeders.supplementary_metrics() {
                    Ok(extra) => supplementary = Some(extra),
                    Err(e) => supplementary_error = Some(e),
                }
                info!("Running eval batches done.");
            }
        }

        let mut metrics = self.aggregator.aggregate(&results)?;
        if let Some(extra) = supplementary {
            metrics.extend(extra);
        }
        let global_step = session.global_step();
        summary::write_metrics(self.sink.as_mut(), &metrics, global_step)?;
        info!("# success: {}", counters.success);
        info!("# skipped: {}", counters.skipped);
        // Batch metrics are written before a supplementary failure is surfaced.
        if let Some(e) = supplementary_error {
            return Err(e);
        }

        let report = EvaluationReport {
            checkpoint: restore_from,
            global_step,
            metrics,
            counters,
            exhausted,
        };
        self.last_report = Some(report.clone());
        Ok(report)
    }

    fn resolve_checkpoint(&self, checkpoint: Option<&Path>) -> Result<PathBuf, EvalError> {
        let dir = self.config.primary_checkpoint_dir()?;
        if let Some(path) = checkpoint {
            return Ok(path.to_path_buf());
        }
        latest_checkpoint(dir)?
            .map(CheckpointPointer::into_path)
            .ok_or_else(|| CheckpointError::NotFound(dir.to_path_buf()).into())
    }
}

/// Time left to wait before the next poll, or `None` when the pass used up
/// the whole interval.
fn remaining_interval(interval: Duration, elapsed: Duration) -> Option<Duration> {
    interval.checked_sub(elapsed).filter(|d| !d.is_zero())
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
