//! Append-only log of tagged scalar metrics.

use std::cell::RefCell;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::EvalError;
use crate::eval::MetricSet;

/// File name of the JSON-lines summary inside a summary directory.
pub const SUMMARY_FILE: &str = "metrics.jsonl";

/// One scalar metric at a training step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub wall_time: f64,
    pub step: u64,
    pub tag: String,
    pub value: f64,
}

/// Destination for tagged scalar metrics.
pub trait SummarySink {
    fn write_scalars(&mut self, step: u64, metrics: &MetricSet) -> Result<(), EvalError>;
}

/// Writes one JSON object per metric to `<summary_dir>/metrics.jsonl`.
pub struct JsonlSummaryWriter {
    path: PathBuf,
}

impl JsonlSummaryWriter {
    pub fn new(summary_dir: &Path) -> Result<Self, EvalError> {
        fs::create_dir_all(summary_dir).map_err(|e| EvalError::Summary {
            path: summary_dir.to_path_buf(),
            source: e,
        })?;
        Ok(JsonlSummaryWriter {
            path: summary_dir.join(SUMMARY_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SummarySink for JsonlSummaryWriter {
    fn write_scalars(&mut self, step: u64, metrics: &MetricSet) -> Result<(), EvalError> {
        let summary_err = |e| EvalError::Summary {
            path: self.path.clone(),
            source: e,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(summary_err)?;

        let wall_time = wall_time_secs();
        for (tag, &value) in metrics {
            let record = SummaryRecord {
                wall_time,
                step,
                tag: tag.clone(),
                value,
            };
            let line = serde_json::to_string(&record)?;
            writeln!(file, "{}", line).map_err(summary_err)?;
        }
        file.flush().map_err(summary_err)?;
        Ok(())
    }
}

/// In-memory sink; clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<SummaryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SummaryRecord> {
        self.records.borrow().clone()
    }
}

impl SummarySink for MemorySink {
    fn write_scalars(&mut self, step: u64, metrics: &MetricSet) -> Result<(), EvalError> {
        let wall_time = wall_time_secs();
        self.records
            .borrow_mut()
            .extend(metrics.iter().map(|(tag, &value)| SummaryRecord {
                wall_time,
                step,
                tag: tag.clone(),
                value,
            }));
        Ok(())
    }
}

/// Log every metric in name order and write the set to `sink` at `step`.
pub fn write_metrics(
    sink: &mut dyn SummarySink,
    metrics: &MetricSet,
    step: u64,
) -> Result<(), EvalError> {
    info!("Writing metrics to summary.");
    for (tag, value) in metrics {
        info!("{}: {:.6}", tag, value);
    }
    sink.write_scalars(step, metrics)?;
    info!("Metrics written to summary.");
    Ok(())
}

/// Read back every record of a JSON-lines summary file.
pub fn read_records(path: &Path) -> Result<Vec<SummaryRecord>, EvalError> {
    let file = fs::File::open(path).map_err(|e| EvalError::Summary {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

fn wall_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> MetricSet {
        [
            ("RecognitionAccuracy".to_string(), 0.75),
            ("NumImages".to_string(), 4.0),
        ]
        .into()
    }

    #[test]
    fn test_jsonl_writer_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let summary_dir = dir.path().join("summaries");
        let mut writer = JsonlSummaryWriter::new(&summary_dir).unwrap();

        writer.write_scalars(100, &sample_metrics()).unwrap();
        writer.write_scalars(200, &sample_metrics()).unwrap();

        let records = read_records(writer.path()).unwrap();
        assert_eq!(records.len(), 4);
        // Sorted by tag within a write
        assert_eq!(records[0].tag, "NumImages");
        assert_eq!(records[1].tag, "RecognitionAccuracy");
        assert_eq!(records[0].step, 100);
        assert_eq!(records[3].step, 200);
        assert!((records[1].value - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_memory_sink_shares_records_between_clones() {
        let sink = MemorySink::new();
        let mut handle = sink.clone();
        write_metrics(&mut handle, &sample_metrics(), 7).unwrap();

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.step == 7));
    }

    #[test]
    fn test_read_records_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_records(&dir.path().join(SUMMARY_FILE)).unwrap_err();
        assert!(matches!(err, EvalError::Summary { .. }));
    }
}
