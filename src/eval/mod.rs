//! Checkpoint evaluation: result accumulation, session seams, and the
//! polling loop that evaluates each new checkpoint.

pub mod evaluator;
pub mod results;
pub mod session;

pub use evaluator::{CheckpointEvaluator, EvalConfig, EvaluationReport, RunStats, GRAPH_FILE};
pub use results::{
    BatchCounters, MetricSet, ResultAccumulator, ResultDict, ResultValue,
};
pub use session::{
    BatchProcessor, DefaultBatchProcessor, EvalModel, EvalSession, FeederGuard, ResultAggregator,
    Restorer,
};
