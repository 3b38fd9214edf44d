use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;
use log::{info, warn};

use crate::error::{BatchError, EvalError};
use crate::eval::{BatchCounters, BatchProcessor, DefaultBatchProcessor, EvalSession, ResultDict};
use crate::recognition::evaluation::normalize_text;
use crate::recognition::{GROUNDTRUTH_TEXT, ORIGINAL_IMAGE, RECOGNITION_TEXT, RECTIFIED_IMAGE};

/// Width of exported visualizations in pixels.
pub const EXPORT_WIDTH: u32 = 128;

/// Export `result`'s input image with its ground-truth and recognized text
/// encoded in the file name.
///
/// Returns the written paths, or an empty list if the result was skipped
/// because it is correct and `only_incorrect` is set.
pub fn visualize_recognition_result(
    result: &ResultDict,
    tag: &str,
    export_dir: &Path,
    only_incorrect: bool,
) -> Result<Vec<PathBuf>, EvalError> {
    let text = |key: &str| {
        result
            .get(key)
            .and_then(|v| v.as_text())
            .map(normalize_text)
            .ok_or_else(|| EvalError::Aggregation(format!("missing text field `{}`", key)))
    };
    let groundtruth = text(GROUNDTRUTH_TEXT)?;
    let recognition = text(RECOGNITION_TEXT)?;
    if only_incorrect && groundtruth == recognition {
        return Ok(Vec::new());
    }

    let image = result
        .get(ORIGINAL_IMAGE)
        .and_then(|v| v.as_image())
        .ok_or_else(|| EvalError::Aggregation(format!("missing image field `{}`", ORIGINAL_IMAGE)))?;

    fs::create_dir_all(export_dir)?;
    let mut written = Vec::new();

    let original_path = export_dir.join(format!(
        "{}_original_{}_{}.png",
        tag, groundtruth, recognition
    ));
    resize_to_export_width(image).save(&original_path)?;
    info!("Detailed visualization exported to {}", original_path.display());
    written.push(original_path);

    if let Some(rectified) = result.get(RECTIFIED_IMAGE).and_then(|v| v.as_image()) {
        let rectified_path = export_dir.join(format!("{}_rectified.png", tag));
        rectified.save(&rectified_path)?;
        info!("Detailed visualization exported to {}", rectified_path.display());
        written.push(rectified_path);
    }

    Ok(written)
}

fn resize_to_export_width(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let scale = EXPORT_WIDTH as f32 / w as f32;
    let new_h = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(image, EXPORT_WIDTH, new_h, FilterType::Triangle)
}

/// Default batch processing that also exports the first `num_visualizations`
/// results as images.
pub struct VisualizingBatchProcessor {
    export_dir: PathBuf,
    num_visualizations: usize,
    only_incorrect: bool,
}

impl VisualizingBatchProcessor {
    pub fn new(export_dir: PathBuf, num_visualizations: usize, only_incorrect: bool) -> Self {
        VisualizingBatchProcessor {
            export_dir,
            num_visualizations,
            only_incorrect,
        }
    }
}

impl<S: EvalSession> BatchProcessor<S> for VisualizingBatchProcessor {
    fn process(
        &mut self,
        session: &mut S,
        batch_index: usize,
        counters: &mut BatchCounters,
    ) -> Result<ResultDict, BatchError> {
        let result = DefaultBatchProcessor.process(session, batch_index, counters)?;
        if batch_index < self.num_visualizations && !result.is_empty() {
            let tag = format!("image-{}", batch_index);
            // Export failures do not affect metrics.
            if let Err(e) =
                visualize_recognition_result(&result, &tag, &self.export_dir, self.only_incorrect)
            {
                warn!("Failed to export visualization {}: {}", tag, e);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CheckpointError;
    use crate::eval::ResultValue;

    /// Produces a wrong recognition for every batch except `corrupt_batch`,
    /// which fails as malformed input.
    struct ScriptedSession {
        corrupt_batch: Option<usize>,
    }

    impl EvalSession for ScriptedSession {
        fn result_keys(&self) -> Vec<String> {
            vec![GROUNDTRUTH_TEXT.to_string(), RECOGNITION_TEXT.to_string()]
        }

        fn restore(&mut self, _checkpoint: &Path) -> Result<(), CheckpointError> {
            Ok(())
        }

        fn run_batch(&mut self, batch_index: usize) -> Result<ResultDict, BatchError> {
            if self.corrupt_batch == Some(batch_index) {
                return Err(BatchError::InvalidInput("truncated".into()));
            }
            Ok(result("word", &format!("w{}", batch_index)))
        }

        fn global_step(&self) -> u64 {
            0
        }
    }

    fn result(groundtruth: &str, recognition: &str) -> ResultDict {
        let mut dict = ResultDict::new();
        dict.insert(GROUNDTRUTH_TEXT.to_string(), groundtruth.into());
        dict.insert(RECOGNITION_TEXT.to_string(), recognition.into());
        dict.insert(
            ORIGINAL_IMAGE.to_string(),
            ResultValue::Image(RgbImage::new(256, 64)),
        );
        dict
    }

    #[test]
    fn test_export_names_file_after_texts() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            visualize_recognition_result(&result("Cat", "cot"), "image-0", dir.path(), false)
                .unwrap();
        assert_eq!(written, vec![dir.path().join("image-0_original_cat_cot.png")]);

        let exported = image::open(&written[0]).unwrap();
        assert_eq!(exported.width(), EXPORT_WIDTH);
        assert_eq!(exported.height(), 32);
    }

    #[test]
    fn test_only_incorrect_skips_correct_result() {
        let dir = tempfile::tempdir().unwrap();
        let written =
            visualize_recognition_result(&result("cat", "CAT"), "image-0", dir.path(), true)
                .unwrap();
        assert!(written.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rectified_image_is_exported() {
        let dir = tempfile::tempdir().unwrap();
        let mut dict = result("a", "b");
        dict.insert(
            RECTIFIED_IMAGE.to_string(),
            ResultValue::Image(RgbImage::new(100, 32)),
        );
        let written = visualize_recognition_result(&dict, "image-3", dir.path(), false).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("image-3_rectified.png").exists());
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut dict = result("a", "b");
        dict.remove(ORIGINAL_IMAGE);
        assert!(visualize_recognition_result(&dict, "t", dir.path(), false).is_err());
    }

    #[test]
    fn test_processor_exports_only_first_batches() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ScriptedSession {
            corrupt_batch: Some(1),
        };
        let mut processor = VisualizingBatchProcessor::new(dir.path().to_path_buf(), 3, false);
        let mut counters = BatchCounters::default();

        for batch in 0..5 {
            let result = processor.process(&mut session, batch, &mut counters).unwrap();
            assert_eq!(result.is_empty(), batch == 1);
        }

        let mut exported: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        exported.sort();
        assert_eq!(
            exported,
            vec![
                "image-0_original_word_w0.png".to_string(),
                "image-2_original_word_w2.png".to_string(),
            ]
        );
        assert_eq!(counters.success, 4);
        assert_eq!(counters.skipped, 1);
    }

    #[test]
    fn test_processor_export_failure_keeps_result() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the export directory should be
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, b"").unwrap();
        let mut session = ScriptedSession {
            corrupt_batch: None,
        };
        let mut processor = VisualizingBatchProcessor::new(blocked, 1, false);
        let mut counters = BatchCounters::default();

        let result = processor.process(&mut session, 0, &mut counters).unwrap();
        assert_eq!(result[RECOGNITION_TEXT].as_text(), Some("w0"));
        assert!(result.contains_key(ORIGINAL_IMAGE));
        assert_eq!(counters.success, 1);
    }
}
