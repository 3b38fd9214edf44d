//! CRNN text recognizer: network, preprocessing, CTC label decoding, and the
//! evaluation model used by the checkpoint evaluator.

mod converter;
mod eval_model;
mod network;
mod preprocess;
mod recognizer;

use std::path::PathBuf;

pub use converter::{LabelConverter, BLANK_INDEX};
pub use eval_model::{
    load_labels, parse_labels, CrnnEvalModel, CrnnEvalSession, DatasetConfig, LabeledSample,
    MEAN_INFERENCE_MILLIS,
};
pub use network::{Crnn, CrnnConfig, INPUT_HEIGHT};
pub use preprocess::{image_to_tensor, resize_normalize};
pub use recognizer::{CrnnRecognizer, TextRecognizer};

use crate::error::PredictError;

/// Model and input settings shared by prediction and evaluation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CrnnSettings {
    /// burn record file holding the trained weights.
    pub model_path: PathBuf,
    /// Alphabet used when `alphabet_path` is not set.
    pub alphabet: String,
    pub alphabet_path: Option<PathBuf>,
    /// Input width images are resized to; the height is fixed at [`INPUT_HEIGHT`].
    pub image_width: u32,
    pub hidden_size: usize,
}

impl Default for CrnnSettings {
    fn default() -> Self {
        CrnnSettings {
            model_path: PathBuf::from("expr/best_model"),
            alphabet: "0123456789abcdefghijklmnopqrstuvwxyz".to_string(),
            alphabet_path: None,
            image_width: 192,
            hidden_size: 256,
        }
    }
}

impl CrnnSettings {
    /// Build the label converter, preferring the alphabet file when configured.
    pub fn converter(&self) -> Result<LabelConverter, PredictError> {
        match &self.alphabet_path {
            Some(path) => LabelConverter::from_file(path),
            None => LabelConverter::new(&self.alphabet),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_converter_uses_inline_alphabet() {
        let settings = CrnnSettings::default();
        assert_eq!(settings.converter().unwrap().num_classes(), 37);
    }

    #[test]
    fn test_alphabet_file_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alphabet.txt");
        std::fs::write(&path, "xyz\n").unwrap();
        let settings = CrnnSettings {
            alphabet_path: Some(path),
            ..Default::default()
        };
        assert_eq!(settings.converter().unwrap().num_classes(), 4);
    }

    #[test]
    fn test_missing_alphabet_file_errors() {
        let settings = CrnnSettings {
            alphabet_path: Some(PathBuf::from("/nonexistent/alphabet.txt")),
            ..Default::default()
        };
        assert!(matches!(
            settings.converter(),
            Err(PredictError::AlphabetRead { .. })
        ));
    }
}
