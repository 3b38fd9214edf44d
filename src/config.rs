use std::path::Path;

use log::warn;

use crate::crnn::{CrnnSettings, DatasetConfig};
use crate::error::ConfigError;
use crate::eval::EvalConfig;
use crate::predict::PredictConfig;
use crate::recognition::RecognitionConfig;

/// Top-level application configuration, loadable from TOML.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub eval: EvalConfig,
    pub recognition: RecognitionConfig,
    pub dataset: DatasetConfig,
    pub crnn: CrnnSettings,
    pub predict: PredictConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!("Config file '{}' not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eval.num_batches == 0 {
            return Err(ConfigError::Validation(
                "eval.num_batches must be > 0".into(),
            ));
        }
        if self.eval.max_evaluations == Some(0) {
            return Err(ConfigError::Validation(
                "eval.max_evaluations must be >= 1 when set".into(),
            ));
        }
        if self.eval.save_graph
            && self
                .eval
                .save_graph_dir
                .as_ref()
                .map_or(true, |d| d.as_os_str().is_empty())
        {
            return Err(ConfigError::Validation(
                "eval.save_graph_dir must be set when eval.save_graph is true".into(),
            ));
        }
        if self.eval.log_every_n_batches == 0 {
            return Err(ConfigError::Validation(
                "eval.log_every_n_batches must be > 0".into(),
            ));
        }

        if self.recognition.num_visualizations > 0 && self.recognition.visualization_dir.is_none() {
            return Err(ConfigError::Validation(
                "recognition.visualization_dir must be set when num_visualizations > 0".into(),
            ));
        }

        if self.crnn.image_width < 4 {
            return Err(ConfigError::Validation(
                "crnn.image_width must be >= 4".into(),
            ));
        }
        if self.crnn.hidden_size == 0 {
            return Err(ConfigError::Validation(
                "crnn.hidden_size must be > 0".into(),
            ));
        }
        if self.crnn.alphabet_path.is_none() && self.crnn.alphabet.trim().is_empty() {
            return Err(ConfigError::Validation(
                "crnn.alphabet must not be empty".into(),
            ));
        }

        if self.predict.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "predict.extensions must have at least one entry".into(),
            ));
        }
        if self.predict.output_file.is_empty() {
            return Err(ConfigError::Validation(
                "predict.output_file must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a TOML string with all default values (useful for creating
    /// example config files).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AppConfig::default()).expect("default config serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        config.validate().expect("default config should be valid");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[eval]
eval_interval_secs = 30
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.eval.eval_interval_secs, 30);
        // Other fields should be defaults
        assert_eq!(config.eval.num_batches, 1);
        assert_eq!(config.predict.progress_every, 1000);
        assert_eq!(config.crnn.image_width, 192);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        let default = AppConfig::default();
        assert_eq!(config.eval.summary_dir, default.eval.summary_dir);
        assert_eq!(config.predict.extensions, default.predict.extensions);
        assert!(config.eval.max_evaluations.is_none());
    }

    #[test]
    fn test_validation_rejects_zero_batches() {
        let mut config = AppConfig::default();
        config.eval.num_batches = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_max_evaluations() {
        let mut config = AppConfig::default();
        config.eval.max_evaluations = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_save_graph_without_dir() {
        let mut config = AppConfig::default();
        config.eval.save_graph = true;
        assert!(config.validate().is_err());
        config.eval.save_graph_dir = Some(PathBuf::from("graphs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_visualizations_without_dir() {
        let mut config = AppConfig::default();
        config.recognition.num_visualizations = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_narrow_images() {
        let mut config = AppConfig::default();
        config.crnn.image_width = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_alphabet() {
        let mut config = AppConfig::default();
        config.crnn.alphabet = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_extensions() {
        let mut config = AppConfig::default();
        config.predict.extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = AppConfig::load_or_default(Path::new("nonexistent_config.toml")).unwrap();
        assert_eq!(config.eval.eval_interval_secs, 120);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[eval]
checkpoint_dirs = ["runs/crnn"]
max_evaluations = 3

[recognition]
case_sensitive = true
"#
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.eval.checkpoint_dirs, vec![PathBuf::from("runs/crnn")]);
        assert_eq!(config.eval.max_evaluations, Some(3));
        assert!(config.recognition.case_sensitive);
        // Others are defaults
        assert_eq!(config.dataset.labels_file, "labels.txt");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[eval]\nnum_batches = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[eval\n").unwrap();
        assert!(matches!(
            AppConfig::load(&path),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_default_toml_roundtrips() {
        let toml_str = AppConfig::default_toml();
        let config: AppConfig = toml::from_str(&toml_str).unwrap();
        config.validate().expect("roundtripped config should be valid");
    }
}
