use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::{debug, info};

use crate::error::{BatchError, CheckpointError, EvalError};
use crate::eval::results::{BatchCounters, MetricSet, ResultAccumulator, ResultDict};

/// An execution context for one evaluation pass.
///
/// A session is opened with freshly initialized parameters, restored from a
/// checkpoint, driven batch by batch, and dropped when the pass ends.
pub trait EvalSession {
    /// Field names this session produces for every batch.
    fn result_keys(&self) -> Vec<String>;

    /// Load model parameters from the checkpoint at `checkpoint`.
    fn restore(&mut self, checkpoint: &Path) -> Result<(), CheckpointError>;

    /// Run inference on the batch at `batch_index`.
    fn run_batch(&mut self, batch_index: usize) -> Result<ResultDict, BatchError>;

    /// Scalar metrics evaluated once after the batch loop.
    fn supplementary_metrics(&mut self) -> Result<MetricSet, EvalError> {
        Ok(MetricSet::new())
    }

    /// Training step of the restored parameters.
    fn global_step(&self) -> u64;

    /// Text description of the model graph, written when graph export is enabled.
    fn graph_def(&self) -> String {
        String::new()
    }

    /// Start background input feeding. Paired with [`EvalSession::stop_feeders`].
    fn start_feeders(&mut self) {}

    /// Stop background input feeding and wait for it to finish.
    fn stop_feeders(&mut self) {}
}

/// Factory for evaluation sessions; one session is opened per pass.
pub trait EvalModel {
    type Session: EvalSession;

    fn open_session(&self) -> Result<Self::Session, EvalError>;
}

/// Restores a session from somewhere other than the watched checkpoint directory.
pub trait Restorer<S: EvalSession> {
    fn restore(&self, session: &mut S) -> Result<(), CheckpointError>;
}

/// Reduces accumulated batch results to scalar metrics.
pub trait ResultAggregator {
    fn aggregate(&self, results: &ResultAccumulator) -> Result<MetricSet, EvalError>;
}

impl<F> ResultAggregator for F
where
    F: Fn(&ResultAccumulator) -> Result<MetricSet, EvalError>,
{
    fn aggregate(&self, results: &ResultAccumulator) -> Result<MetricSet, EvalError> {
        self(results)
    }
}

/// Produces the result dict for one batch.
///
/// Returning an empty dict skips the input. Returning
/// [`BatchError::Exhausted`] ends the batch loop early.
pub trait BatchProcessor<S: EvalSession> {
    fn process(
        &mut self,
        session: &mut S,
        batch_index: usize,
        counters: &mut BatchCounters,
    ) -> Result<ResultDict, BatchError>;
}

/// Runs one batch and counts it; malformed inputs are counted as skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBatchProcessor;

impl<S: EvalSession> BatchProcessor<S> for DefaultBatchProcessor {
    fn process(
        &mut self,
        session: &mut S,
        batch_index: usize,
        counters: &mut BatchCounters,
    ) -> Result<ResultDict, BatchError> {
        match session.run_batch(batch_index) {
            Ok(result) => {
                counters.success += 1;
                Ok(result)
            }
            Err(BatchError::InvalidInput(reason)) => {
                info!("Skipping batch {}: {}", batch_index, reason);
                counters.skipped += 1;
                Ok(ResultDict::new())
            }
            Err(BatchError::Exhausted) => Err(BatchError::Exhausted),
        }
    }
}

/// Keeps a session's background feeders running for the guard's lifetime.
///
/// Feeders are stopped on drop, so they are shut down on early return and on
/// error paths alike.
pub struct FeederGuard<'a, S: EvalSession> {
    session: &'a mut S,
}

impl<'a, S: EvalSession> FeederGuard<'a, S> {
    pub fn start(session: &'a mut S) -> Self {
        debug!("Starting input feeders");
        session.start_feeders();
        FeederGuard { session }
    }
}

impl<S: EvalSession> Deref for FeederGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
    }
}

impl<S: EvalSession> DerefMut for FeederGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
    }
}

impl<S: EvalSession> Drop for FeederGuard<'_, S> {
    fn drop(&mut self) {
        self.session.stop_feeders();
        debug!("Input feeders stopped");
    }
}
