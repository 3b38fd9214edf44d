use std::collections::HashSet;

use log::warn;

use crate::error::EvalError;
use crate::eval::{MetricSet, ResultAccumulator, ResultAggregator, ResultValue};
use crate::recognition::{RecognitionConfig, FILENAME, GROUNDTRUTH_TEXT, RECOGNITION_TEXT};

/// Fields a recognition result set must carry, all with equal length.
pub const REQUIRED_FIELDS: [&str; 3] = [GROUNDTRUTH_TEXT, RECOGNITION_TEXT, FILENAME];

/// Keep ASCII letters and digits, lower-cased.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Character-level Levenshtein distance.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

struct RecognitionEntry {
    recognition: String,
    groundtruth: String,
}

/// Scores recognized text against ground truth, one entry per image.
pub struct RecognitionEvaluation {
    case_sensitive: bool,
    entries: Vec<RecognitionEntry>,
    seen: HashSet<String>,
}

impl RecognitionEvaluation {
    pub fn new(case_sensitive: bool) -> Self {
        RecognitionEvaluation {
            case_sensitive,
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Record one image. Returns false (and ignores the entry) if `image_id`
    /// was already added.
    pub fn add_single_image(&mut self, image_id: &str, recognition: &str, groundtruth: &str) -> bool {
        if !self.seen.insert(image_id.to_string()) {
            warn!("Image with id {} has already been added, ignoring", image_id);
            return false;
        }
        self.entries.push(RecognitionEntry {
            recognition: self.prepare(recognition),
            groundtruth: self.prepare(groundtruth),
        });
        true
    }

    pub fn num_images(&self) -> usize {
        self.entries.len()
    }

    /// Compute accuracy and normalized edit distance over all added images.
    pub fn evaluate_all(&self) -> MetricSet {
        let n = self.entries.len();
        let mut metrics = MetricSet::new();
        metrics.insert("NumImages".to_string(), n as f64);
        if n == 0 {
            metrics.insert("RecognitionAccuracy".to_string(), 0.0);
            metrics.insert("NormalizedEditDistance".to_string(), 0.0);
            return metrics;
        }

        let correct = self
            .entries
            .iter()
            .filter(|e| e.recognition == e.groundtruth)
            .count();
        let total_distance: f64 = self
            .entries
            .iter()
            .map(|e| {
                let longest = e.recognition.chars().count().max(e.groundtruth.chars().count());
                if longest == 0 {
                    0.0
                } else {
                    edit_distance(&e.recognition, &e.groundtruth) as f64 / longest as f64
                }
            })
            .sum();

        metrics.insert("RecognitionAccuracy".to_string(), correct as f64 / n as f64);
        metrics.insert("NormalizedEditDistance".to_string(), total_distance / n as f64);
        metrics
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
    }

    fn prepare(&self, text: &str) -> String {
        if self.case_sensitive {
            text.to_string()
        } else {
            normalize_text(text)
        }
    }
}

/// Aggregates `filename`, `recognition_text` and `groundtruth_text` fields
/// into recognition metrics.
#[derive(Debug, Clone, Default)]
pub struct RecognitionAggregator {
    config: RecognitionConfig,
}

impl RecognitionAggregator {
    pub fn new(config: RecognitionConfig) -> Self {
        RecognitionAggregator { config }
    }
}

impl ResultAggregator for RecognitionAggregator {
    fn aggregate(&self, results: &ResultAccumulator) -> Result<MetricSet, EvalError> {
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|k| !results.contains_key(k)) {
            return Err(EvalError::Aggregation(format!(
                "result lists do not have expected key set (missing `{}`)",
                missing
            )));
        }
        let num_results = results.len_of(REQUIRED_FIELDS[0]);
        if REQUIRED_FIELDS
            .iter()
            .any(|k| results.len_of(k) != num_results)
        {
            return Err(EvalError::Aggregation(
                "inconsistent list sizes in result lists".into(),
            ));
        }

        let filenames = text_field(results, FILENAME)?;
        let recognitions = text_field(results, RECOGNITION_TEXT)?;
        let groundtruths = text_field(results, GROUNDTRUTH_TEXT)?;

        let mut evaluator = RecognitionEvaluation::new(self.config.case_sensitive);
        for ((image_id, recognition), groundtruth) in
            filenames.iter().zip(&recognitions).zip(&groundtruths)
        {
            evaluator.add_single_image(image_id, recognition, groundtruth);
        }
        Ok(evaluator.evaluate_all())
    }
}

fn text_field<'a>(results: &'a ResultAccumulator, key: &str) -> Result<Vec<&'a str>, EvalError> {
    let values = results.get(key).unwrap_or_default();
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_text().ok_or_else(|| {
                EvalError::Aggregation(format!("field `{}` holds a non-text value at {}", key, i))
            })
        })
        .collect()
}
