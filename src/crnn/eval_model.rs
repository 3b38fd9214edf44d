use std::cmp::Ordering as IndexOrdering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use burn::prelude::*;
use image::DynamicImage;
use log::{debug, info, warn};

use crate::checkpoint::global_step_from_path;
use crate::crnn::recognizer::{CrnnRecognizer, TextRecognizer};
use crate::crnn::{CrnnSettings, LabelConverter};
use crate::error::{BatchError, CheckpointError, EvalError};
use crate::eval::{EvalModel, EvalSession, MetricSet, ResultDict, ResultValue};
use crate::recognition::{FILENAME, GROUNDTRUTH_TEXT, ORIGINAL_IMAGE, RECOGNITION_TEXT};

/// Supplementary metric: mean forward-pass time per recognized image.
pub const MEAN_INFERENCE_MILLIS: &str = "MeanInferenceMillis";

const FEEDER_CAPACITY: usize = 8;

/// Location of a labeled evaluation set.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub data_dir: PathBuf,
    /// Labels file inside `data_dir`, one `filename<TAB or comma>label` per line.
    pub labels_file: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            data_dir: PathBuf::from("data/eval"),
            labels_file: "labels.txt".to_string(),
        }
    }
}

impl DatasetConfig {
    pub fn labels_path(&self) -> PathBuf {
        self.data_dir.join(&self.labels_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledSample {
    pub filename: String,
    pub text: String,
}

/// Parse a labels file. Lines are split on the first tab, or on the first
/// comma when there is no tab. Blank lines and a `name,label` header are skipped.
pub fn parse_labels(content: &str) -> Vec<LabeledSample> {
    let mut samples = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let split = line.split_once('\t').or_else(|| line.split_once(','));
        let Some((filename, text)) = split else {
            warn!("Ignoring labels line {}: no separator", line_no + 1);
            continue;
        };
        if samples.is_empty() && filename == "name" && text == "label" {
            continue;
        }
        samples.push(LabeledSample {
            filename: filename.trim().to_string(),
            text: text.to_string(),
        });
    }
    samples
}

pub fn load_labels(path: &Path) -> Result<Vec<LabeledSample>, EvalError> {
    let content = fs::read_to_string(path).map_err(|e| {
        EvalError::Session(format!("failed to read labels {}: {}", path.display(), e))
    })?;
    Ok(parse_labels(&content))
}

fn decode_image(path: &Path) -> Result<DynamicImage, String> {
    image::open(path).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Opens CRNN sessions over a labeled image directory, one sample per batch.
pub struct CrnnEvalModel<B: Backend> {
    settings: CrnnSettings,
    converter: LabelConverter,
    data_dir: PathBuf,
    samples: Arc<Vec<LabeledSample>>,
    device: B::Device,
}

impl<B: Backend> CrnnEvalModel<B> {
    pub fn new(
        settings: CrnnSettings,
        dataset: &DatasetConfig,
        device: B::Device,
    ) -> Result<Self, EvalError> {
        let converter = settings
            .converter()
            .map_err(|e| EvalError::Config(e.to_string()))?;
        let samples = load_labels(&dataset.labels_path())?;
        if samples.is_empty() {
            warn!("No labeled samples in {}", dataset.labels_path().display());
        } else {
            info!(
                "Loaded {} labeled samples from {}",
                samples.len(),
                dataset.labels_path().display()
            );
        }
        Ok(CrnnEvalModel {
            settings,
            converter,
            data_dir: dataset.data_dir.clone(),
            samples: Arc::new(samples),
            device,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }
}

impl<B: Backend> EvalModel for CrnnEvalModel<B> {
    type Session = CrnnEvalSession<B>;

    fn open_session(&self) -> Result<CrnnEvalSession<B>, EvalError> {
        let recognizer =
            CrnnRecognizer::new(self.converter.clone(), &self.settings, self.device.clone());
        Ok(CrnnEvalSession {
            recognizer,
            samples: Arc::clone(&self.samples),
            data_dir: self.data_dir.clone(),
            global_step: 0,
            feeder: None,
            inference_micros: 0,
            inferences: 0,
        })
    }
}

struct Feeder {
    stop: Arc<AtomicBool>,
    receiver: mpsc::Receiver<(usize, Result<DynamicImage, String>)>,
    handle: JoinHandle<()>,
}

impl Feeder {
    /// Decode samples in order on a background thread, a bounded number ahead.
    fn spawn(samples: Arc<Vec<LabeledSample>>, data_dir: PathBuf) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, receiver) = mpsc::sync_channel(FEEDER_CAPACITY);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            for (index, sample) in samples.iter().enumerate() {
                if thread_stop.load(Ordering::Relaxed) {
                    break;
                }
                let decoded = decode_image(&data_dir.join(&sample.filename));
                if tx.send((index, decoded)).is_err() {
                    break;
                }
            }
        });
        Feeder {
            stop,
            receiver,
            handle,
        }
    }

    fn shutdown(self) {
        self.stop.store(true, Ordering::Relaxed);
        // Dropping the receiver unblocks a pending send.
        drop(self.receiver);
        if self.handle.join().is_err() {
            warn!("Image feeder thread panicked");
        }
    }
}

/// One evaluation pass over the labeled samples.
pub struct CrnnEvalSession<B: Backend> {
    recognizer: CrnnRecognizer<B>,
    samples: Arc<Vec<LabeledSample>>,
    data_dir: PathBuf,
    global_step: u64,
    feeder: Option<Feeder>,
    inference_micros: u128,
    inferences: usize,
}

impl<B: Backend> CrnnEvalSession<B> {
    fn next_image(&mut self, batch_index: usize, filename: &str) -> Result<DynamicImage, BatchError> {
        if let Some(feeder) = &self.feeder {
            while let Ok((index, decoded)) = feeder.receiver.recv() {
                match index.cmp(&batch_index) {
                    IndexOrdering::Less => continue,
                    IndexOrdering::Equal => return decoded.map_err(BatchError::InvalidInput),
                    IndexOrdering::Greater => break,
                }
            }
        }
        decode_image(&self.data_dir.join(filename)).map_err(BatchError::InvalidInput)
    }
}

impl<B: Backend> EvalSession for CrnnEvalSession<B> {
    fn result_keys(&self) -> Vec<String> {
        [FILENAME, GROUNDTRUTH_TEXT, RECOGNITION_TEXT, ORIGINAL_IMAGE]
            .iter()
            .map(|k| k.to_string())
            .collect()
    }

    fn restore(&mut self, checkpoint: &Path) -> Result<(), CheckpointError> {
        self.recognizer.load_weights(checkpoint)?;
        self.global_step = global_step_from_path(checkpoint).unwrap_or(0);
        debug!(
            "Restored CRNN weights from {} (step {})",
            checkpoint.display(),
            self.global_step
        );
        Ok(())
    }

    fn run_batch(&mut self, batch_index: usize) -> Result<ResultDict, BatchError> {
        let sample = self
            .samples
            .get(batch_index)
            .cloned()
            .ok_or(BatchError::Exhausted)?;
        let image = self.next_image(batch_index, &sample.filename)?;

        let start = Instant::now();
        let recognition = self
            .recognizer
            .recognize(&image)
            .map_err(|e| BatchError::InvalidInput(e.to_string()))?;
        self.inference_micros += start.elapsed().as_micros();
        self.inferences += 1;

        Ok(ResultDict::from([
            (FILENAME.to_string(), ResultValue::from(sample.filename)),
            (GROUNDTRUTH_TEXT.to_string(), ResultValue::from(sample.text)),
            (RECOGNITION_TEXT.to_string(), ResultValue::from(recognition)),
            (ORIGINAL_IMAGE.to_string(), ResultValue::from(image.to_rgb8())),
        ]))
    }

    fn supplementary_metrics(&mut self) -> Result<MetricSet, EvalError> {
        let mean_ms = if self.inferences == 0 {
            0.0
        } else {
            self.inference_micros as f64 / self.inferences as f64 / 1000.0
        };
        Ok(MetricSet::from([(MEAN_INFERENCE_MILLIS.to_string(), mean_ms)]))
    }

    fn global_step(&self) -> u64 {
        self.global_step
    }

    fn graph_def(&self) -> String {
        format!("{:#?}", self.recognizer.model())
    }

    fn start_feeders(&mut self) {
        if self.feeder.is_none() {
            self.feeder = Some(Feeder::spawn(
                Arc::clone(&self.samples),
                self.data_dir.clone(),
            ));
        }
    }

    fn stop_feeders(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.shutdown();
        }
    }
}

impl<B: Backend> Drop for CrnnEvalSession<B> {
    fn drop(&mut self) {
        self.stop_feeders();
    }
}
