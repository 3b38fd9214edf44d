//! Batch prediction over a directory of cropped text images.
//!
//! Images are found by walking the input directory recursively, recognized
//! one at a time, and appended to a `name,label` CSV file with CRLF line
//! endings.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::crnn::TextRecognizer;
use crate::error::PredictError;

pub const CSV_HEADER: &str = "name,label";
const LINE_END: &str = "\r\n";

/// Settings for a prediction run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub test_data_path: PathBuf,
    pub output_path: PathBuf,
    pub output_file: String,
    /// File-name suffixes accepted as images (case-sensitive).
    pub extensions: Vec<String>,
    pub progress_every: usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        PredictConfig {
            test_data_path: PathBuf::from("/content/test_cptn_result"),
            output_path: PathBuf::from("./"),
            output_file: "crnn_train_result_0606.csv".to_string(),
            extensions: ["jpg", "png", "jpeg", "JPG"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            progress_every: 1000,
        }
    }
}

impl PredictConfig {
    pub fn output_csv(&self) -> PathBuf {
        self.output_path.join(&self.output_file)
    }
}

/// Recursively collect files under `root` whose names end with one of
/// `extensions`. The result is sorted for a stable output order.
pub fn collect_images(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, PredictError> {
    if !root.is_dir() {
        return Err(PredictError::InputDirNotFound(root.to_path_buf()));
    }
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            // Symlinked directories are not descended into.
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if has_image_suffix(&path, extensions) {
                files.push(path);
            }
        }
    }
    files.sort();
    info!("Found {} images in {}", files.len(), root.display());
    Ok(files)
}

fn has_image_suffix(path: &Path, extensions: &[String]) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| extensions.iter().any(|ext| name.ends_with(ext.as_str())))
}

/// Appends `name,label` rows to a CSV file.
pub struct CsvResultWriter {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl CsvResultWriter {
    /// Open `path` for appending; the header is written only when the file is
    /// new or empty.
    pub fn open(path: &Path) -> Result<Self, PredictError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if is_empty {
            write!(writer, "{}{}", CSV_HEADER, LINE_END)?;
        }
        Ok(CsvResultWriter {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn write_row(&mut self, name: &str, label: &str) -> Result<(), PredictError> {
        write!(
            self.writer,
            "{},{}{}",
            csv_field(name),
            csv_field(label),
            LINE_END
        )?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), PredictError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Quote a field only when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictStats {
    pub found: usize,
    pub recognized: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Runs a recognizer over every image in the configured directory.
pub struct Predictor<R: TextRecognizer> {
    recognizer: R,
    config: PredictConfig,
}

impl<R: TextRecognizer> Predictor<R> {
    pub fn new(recognizer: R, config: PredictConfig) -> Self {
        Predictor { recognizer, config }
    }

    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    pub fn run(&mut self) -> Result<PredictStats, PredictError> {
        let started = Instant::now();
        let images = collect_images(&self.config.test_data_path, &self.config.extensions)?;
        let mut csv = CsvResultWriter::open(&self.config.output_csv())?;
        let mut stats = PredictStats {
            found: images.len(),
            ..Default::default()
        };

        for (i, path) in images.iter().enumerate() {
            if self.config.progress_every > 0 && i % self.config.progress_every == 0 {
                info!("Processed {} / {} images", i, images.len());
            }
            let image = match image::open(path) {
                Ok(image) => image,
                Err(source) => {
                    let err = PredictError::ImageDecode {
                        path: path.clone(),
                        source,
                    };
                    warn!("Skipping image: {}", err);
                    stats.skipped += 1;
                    continue;
                }
            };
            let label = self.recognizer.recognize(&image)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            csv.write_row(&name, &label)?;
            stats.recognized += 1;
        }
        csv.flush()?;

        stats.elapsed = started.elapsed();
        info!(
            "Wrote {} predictions to {} ({} skipped), elapsed time: {:.3}s",
            stats.recognized,
            csv.path().display(),
            stats.skipped,
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }
}
