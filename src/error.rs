use std::path::PathBuf;

/// Errors that can occur while locating or restoring checkpoints.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("no checkpoint found in {0}")]
    NotFound(PathBuf),

    #[error("failed to read checkpoint pointer {path}: {source}")]
    PointerRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to restore checkpoint {path}: {reason}")]
    Restore { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a single batch that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// The input for this batch was malformed; the batch is skipped.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The input stream has no more data.
    #[error("input stream exhausted")]
    Exhausted,
}

/// Errors that can occur during an evaluation pass.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("invalid evaluation config: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("aggregation failed: {0}")]
    Aggregation(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("failed to write summary {path}: {source}")]
    Summary {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("visualization export failed: {0}")]
    Visualization(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur in the batch predictor.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("input directory not found: {0}")]
    InputDirNotFound(PathBuf),

    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("failed to read alphabet from {path}: {source}")]
    AlphabetRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("alphabet must not be empty")]
    EmptyAlphabet,

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_error_display() {
        let err = CheckpointError::NotFound(PathBuf::from("checkpoints"));
        assert_eq!(err.to_string(), "no checkpoint found in checkpoints");
    }

    #[test]
    fn test_eval_error_wraps_checkpoint_error() {
        let err: EvalError = CheckpointError::NotFound(PathBuf::from("ckpt")).into();
        assert_eq!(
            err.to_string(),
            "checkpoint error: no checkpoint found in ckpt"
        );
    }

    #[test]
    fn test_batch_error_display() {
        let err = BatchError::InvalidInput("truncated png".to_string());
        assert_eq!(err.to_string(), "invalid input: truncated png");
        assert_eq!(BatchError::Exhausted.to_string(), "input stream exhausted");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Validation("eval.num_batches must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "config validation error: eval.num_batches must be > 0"
        );
    }
}
