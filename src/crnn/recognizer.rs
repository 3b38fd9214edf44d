use std::path::Path;

use burn::prelude::*;
use burn::record::DefaultRecorder;
use image::DynamicImage;

use crate::checkpoint::record_file;
use crate::crnn::converter::LabelConverter;
use crate::crnn::network::{Crnn, CrnnConfig, INPUT_HEIGHT};
use crate::crnn::preprocess::image_to_tensor;
use crate::crnn::CrnnSettings;
use crate::error::{CheckpointError, PredictError};

/// Recognizes the text in a single cropped image.
pub trait TextRecognizer {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, PredictError>;
}

/// CRNN inference with greedy CTC decoding.
pub struct CrnnRecognizer<B: Backend> {
    model: Crnn<B>,
    converter: LabelConverter,
    input_width: u32,
    device: B::Device,
}

impl<B: Backend> CrnnRecognizer<B> {
    /// Build a recognizer with freshly initialized weights.
    pub fn new(converter: LabelConverter, settings: &CrnnSettings, device: B::Device) -> Self {
        let model = CrnnConfig::new(converter.num_classes())
            .with_hidden_size(settings.hidden_size)
            .init::<B>(&device);
        CrnnRecognizer {
            model,
            converter,
            input_width: settings.image_width,
            device,
        }
    }

    /// Build a recognizer and load weights from a burn record file.
    pub fn load(
        model_path: &Path,
        converter: LabelConverter,
        settings: &CrnnSettings,
        device: B::Device,
    ) -> Result<Self, CheckpointError> {
        let mut recognizer = Self::new(converter, settings, device);
        recognizer.load_weights(model_path)?;
        Ok(recognizer)
    }

    /// Replace the network weights with those stored for checkpoint `path`.
    pub fn load_weights(&mut self, path: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        self.model = self
            .model
            .clone()
            .load_file(record_file(path), &recorder, &self.device)
            .map_err(|e| CheckpointError::Restore {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Save the network weights where [`load_weights`](Self::load_weights)
    /// looks for them.
    pub fn save_weights(&self, path: &Path) -> Result<(), CheckpointError> {
        let recorder = DefaultRecorder::default();
        self.model
            .clone()
            .save_file(record_file(path), &recorder)
            .map_err(|e| CheckpointError::Restore {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    pub fn converter(&self) -> &LabelConverter {
        &self.converter
    }

    pub fn model(&self) -> &Crnn<B> {
        &self.model
    }
}

impl<B: Backend> TextRecognizer for CrnnRecognizer<B> {
    fn recognize(&mut self, image: &DynamicImage) -> Result<String, PredictError> {
        let input = image_to_tensor::<B>(image, self.input_width, INPUT_HEIGHT as u32, &self.device);
        let scores = self.model.forward(input);
        let [_, _, num_classes] = scores.dims();
        let data: Vec<f32> = scores
            .into_data()
            .to_vec()
            .map_err(|e| PredictError::Inference(format!("{:?}", e)))?;
        Ok(self.converter.decode_scores(&data, num_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::RgbImage;

    type TestBackend = NdArray<f32>;

    fn small_settings() -> CrnnSettings {
        CrnnSettings {
            hidden_size: 16,
            image_width: 64,
            ..Default::default()
        }
    }

    #[test]
    fn test_recognize_returns_alphabet_chars_only() {
        let converter = LabelConverter::new("abc").unwrap();
        let mut recognizer =
            CrnnRecognizer::<TestBackend>::new(converter, &small_settings(), Default::default());
        let image = DynamicImage::ImageRgb8(RgbImage::new(40, 20));

        let text = recognizer.recognize(&image).unwrap();
        assert!(text.chars().all(|c| "abc".contains(c)));
        // At most one character per timestep (64 / 4)
        assert!(text.chars().count() <= 16);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crnn-10");
        let settings = small_settings();
        let converter = LabelConverter::new("abc").unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 32, |x, y| {
            image::Rgb([(x * 4) as u8, (y * 8) as u8, 0])
        }));

        let mut original =
            CrnnRecognizer::<TestBackend>::new(converter.clone(), &settings, Default::default());
        original.save_weights(&path).unwrap();
        assert!(dir.path().join("crnn-10.mpk").exists());

        let mut restored =
            CrnnRecognizer::<TestBackend>::load(&path, converter, &settings, Default::default())
                .unwrap();
        assert_eq!(
            original.recognize(&image).unwrap(),
            restored.recognize(&image).unwrap()
        );
    }

    #[test]
    fn test_dotted_checkpoint_name_keeps_full_stem() {
        let dir = tempfile::tempdir().unwrap();
        let settings = small_settings();
        let converter = LabelConverter::new("abc").unwrap();
        let recognizer =
            CrnnRecognizer::<TestBackend>::new(converter, &settings, Default::default());

        recognizer.save_weights(&dir.path().join("model.ckpt-300")).unwrap();
        assert!(dir.path().join("model.ckpt-300.mpk").exists());
        assert!(!dir.path().join("model.mpk").exists());
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let dir = tempfile::tempdir().unwrap();
        let converter = LabelConverter::new("abc").unwrap();
        let result = CrnnRecognizer::<TestBackend>::load(
            &dir.path().join("missing"),
            converter,
            &small_settings(),
            Default::default(),
        );
        assert!(matches!(result, Err(CheckpointError::Restore { .. })));
    }
}
