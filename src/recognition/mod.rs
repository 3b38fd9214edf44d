//! Recognition scoring and visualization for text-recognition evaluation.

mod evaluation;
mod visualize;

use std::path::PathBuf;

pub use evaluation::{
    edit_distance, normalize_text, RecognitionAggregator, RecognitionEvaluation, REQUIRED_FIELDS,
};
pub use visualize::{visualize_recognition_result, VisualizingBatchProcessor, EXPORT_WIDTH};

pub const FILENAME: &str = "filename";
pub const GROUNDTRUTH_TEXT: &str = "groundtruth_text";
pub const RECOGNITION_TEXT: &str = "recognition_text";
pub const ORIGINAL_IMAGE: &str = "original_image";
pub const RECTIFIED_IMAGE: &str = "rectified_image";

/// Recognition scoring and visualization settings.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Compare raw text instead of lower-cased alphanumerics.
    pub case_sensitive: bool,
    /// Export the first N batch results as images.
    pub num_visualizations: usize,
    pub visualization_dir: Option<PathBuf>,
    pub only_visualize_incorrect: bool,
}
