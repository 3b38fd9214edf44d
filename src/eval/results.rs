use std::collections::BTreeMap;

use image::RgbImage;

/// A single field value produced by one evaluation batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Text(String),
    Number(f64),
    Image(RgbImage),
}

impl ResultValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResultValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ResultValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&RgbImage> {
        match self {
            ResultValue::Image(img) => Some(img),
            _ => None,
        }
    }
}

impl From<&str> for ResultValue {
    fn from(s: &str) -> Self {
        ResultValue::Text(s.to_string())
    }
}

impl From<String> for ResultValue {
    fn from(s: String) -> Self {
        ResultValue::Text(s)
    }
}

impl From<f64> for ResultValue {
    fn from(v: f64) -> Self {
        ResultValue::Number(v)
    }
}

impl From<RgbImage> for ResultValue {
    fn from(img: RgbImage) -> Self {
        ResultValue::Image(img)
    }
}

/// Field name to value for one batch. An empty dict means "skip this input".
pub type ResultDict = BTreeMap<String, ResultValue>;

/// Metric name to scalar value.
pub type MetricSet = BTreeMap<String, f64>;

/// Per-field sequences of batch results, keyed by a fixed set of field names.
///
/// Fields outside the key set given at construction are dropped on append,
/// and a batch that does not produce a field contributes nothing to it.
#[derive(Debug, Clone, Default)]
pub struct ResultAccumulator {
    fields: BTreeMap<String, Vec<ResultValue>>,
}

impl ResultAccumulator {
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResultAccumulator {
            fields: keys.into_iter().map(|k| (k.into(), Vec::new())).collect(),
        }
    }

    /// Append one batch's results. Returns the number of fields that were kept.
    pub fn append(&mut self, result: ResultDict) -> usize {
        let mut kept = 0;
        for (key, value) in result {
            if let Some(values) = self.fields.get_mut(&key) {
                values.push(value);
                kept += 1;
            }
        }
        kept
    }

    pub fn get(&self, key: &str) -> Option<&[ResultValue]> {
        self.fields.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of values collected for `key` (0 for unknown keys).
    pub fn len_of(&self, key: &str) -> usize {
        self.fields.get(key).map_or(0, Vec::len)
    }
}

/// Batch outcome counts, used for diagnostic logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchCounters {
    pub success: usize,
    pub skipped: usize,
}

impl BatchCounters {
    pub fn attempted(&self) -> usize {
        self.success + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, &str)]) -> ResultDict {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ResultValue::from(*v)))
            .collect()
    }

    #[test]
    fn test_append_keeps_only_known_keys() {
        let mut acc = ResultAccumulator::with_keys(["filename", "recognition_text"]);
        let kept = acc.append(dict(&[
            ("filename", "a.png"),
            ("recognition_text", "cat"),
            ("debug_scores", "0.9"),
        ]));
        assert_eq!(kept, 2);
        assert_eq!(acc.len_of("filename"), 1);
        assert_eq!(acc.len_of("recognition_text"), 1);
        assert!(!acc.contains_key("debug_scores"));
    }

    #[test]
    fn test_missing_field_adds_no_placeholder() {
        let mut acc = ResultAccumulator::with_keys(["filename", "recognition_text"]);
        acc.append(dict(&[("filename", "a.png"), ("recognition_text", "cat")]));
        acc.append(dict(&[("filename", "b.png")]));
        acc.append(ResultDict::new());

        assert_eq!(acc.len_of("filename"), 2);
        assert_eq!(acc.len_of("recognition_text"), 1);
    }

    #[test]
    fn test_values_keep_batch_order() {
        let mut acc = ResultAccumulator::with_keys(["filename"]);
        for name in ["a.png", "b.png", "c.png"] {
            acc.append(dict(&[("filename", name)]));
        }
        let names: Vec<&str> = acc
            .get("filename")
            .unwrap()
            .iter()
            .filter_map(ResultValue::as_text)
            .collect();
        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_result_value_accessors() {
        assert_eq!(ResultValue::from("x").as_text(), Some("x"));
        assert_eq!(ResultValue::from(0.5).as_number(), Some(0.5));
        assert!(ResultValue::from(0.5).as_text().is_none());
        let img = RgbImage::new(2, 2);
        assert_eq!(ResultValue::from(img).as_image().map(|i| i.width()), Some(2));
    }

    #[test]
    fn test_counters_attempted() {
        let c = BatchCounters {
            success: 7,
            skipped: 3,
        };
        assert_eq!(c.attempted(), 10);
    }
}
