use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CheckpointError;

/// Name of the text file that records the newest checkpoint in a directory.
pub const POINTER_FILE: &str = "checkpoint";

/// Symlink fallback used when no pointer file exists.
pub const LATEST_LINK: &str = "latest";

const POINTER_KEY: &str = "model_checkpoint_path:";

/// Suffixes under which a checkpoint's payload may be stored on disk.
const PAYLOAD_SUFFIXES: [&str; 2] = [".index", ".mpk"];

const RECORD_SUFFIX: &str = ".mpk";

/// Record file holding the network inside a directory-style checkpoint.
pub const DIR_RECORD_FILE: &str = "crnn.mpk";

/// The most recent checkpoint in a watched directory.
///
/// Two pointers are equal when their paths are equal; the polling loop uses
/// this to decide whether a checkpoint has already been evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPointer {
    path: PathBuf,
}

impl CheckpointPointer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointPointer { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }

    /// Training step encoded in the checkpoint name (`<prefix>-<step>`).
    pub fn global_step(&self) -> Option<u64> {
        global_step_from_path(&self.path)
    }
}

/// Parse the trailing `-<step>` or `_<step>` of a checkpoint name, ignoring
/// payload suffixes such as `.mpk`.
pub fn global_step_from_path(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    let stem = PAYLOAD_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name);
    let split = stem.rfind(|c: char| c == '-' || c == '_')?;
    stem[split + 1..].parse().ok()
}

/// Full path of the burn record file for `checkpoint`.
///
/// A directory checkpoint stores its record as [`DIR_RECORD_FILE`]. Any other
/// path gets `.mpk` appended unless it already ends with it, so dotted names
/// like `model.ckpt-300` keep their full stem.
pub fn record_file(checkpoint: &Path) -> PathBuf {
    if checkpoint.is_dir() {
        return checkpoint.join(DIR_RECORD_FILE);
    }
    if checkpoint.as_os_str().to_string_lossy().ends_with(RECORD_SUFFIX) {
        return checkpoint.to_path_buf();
    }
    let mut with_suffix = OsString::from(checkpoint.as_os_str());
    with_suffix.push(RECORD_SUFFIX);
    PathBuf::from(with_suffix)
}

/// Resolve the newest checkpoint in `dir`.
///
/// Reads the `checkpoint` pointer file first and falls back to a `latest`
/// symlink. Returns `Ok(None)` when the directory does not exist yet, when no
/// pointer is present, or when the pointed-to checkpoint has no payload on disk.
pub fn latest_checkpoint(dir: &Path) -> Result<Option<CheckpointPointer>, CheckpointError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let candidate = match read_pointer_file(dir)? {
        Some(path) => Some(path),
        None => read_latest_link(dir)?,
    };

    Ok(candidate
        .filter(|path| payload_exists(path))
        .map(CheckpointPointer::new))
}

/// Record `name` as the newest checkpoint in `dir`.
///
/// The pointer file is written to a temporary file and renamed into place so a
/// concurrent reader never observes a partial write.
pub fn write_checkpoint_pointer(dir: &Path, name: &str) -> Result<PathBuf, CheckpointError> {
    fs::create_dir_all(dir)?;
    let pointer_path = dir.join(POINTER_FILE);
    let tmp_path = dir.join(format!("{}.tmp", POINTER_FILE));
    let content = format!(
        "{key} \"{name}\"\nall_model_checkpoint_paths: \"{name}\"\n",
        key = POINTER_KEY
    );
    fs::write(&tmp_path, content)?;
    fs::rename(&tmp_path, &pointer_path)?;
    Ok(dir.join(name))
}

fn read_pointer_file(dir: &Path) -> Result<Option<PathBuf>, CheckpointError> {
    let pointer_path = dir.join(POINTER_FILE);
    if !pointer_path.is_file() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(&pointer_path).map_err(|e| CheckpointError::PointerRead {
            path: pointer_path.clone(),
            source: e,
        })?;

    let value = content.lines().find_map(|line| {
        line.trim()
            .strip_prefix(POINTER_KEY)
            .map(|rest| rest.trim().trim_matches('"').to_string())
    });

    Ok(value
        .filter(|v| !v.is_empty())
        .map(|v| resolve_relative(dir, PathBuf::from(v))))
}

fn read_latest_link(dir: &Path) -> Result<Option<PathBuf>, CheckpointError> {
    let link_path = dir.join(LATEST_LINK);
    if link_path.symlink_metadata().is_err() {
        return Ok(None);
    }
    let resolved = fs::read_link(&link_path)?;
    Ok(Some(resolve_relative(dir, resolved)))
}

fn resolve_relative(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() {
        dir.join(path)
    } else {
        path
    }
}

fn payload_exists(path: &Path) -> bool {
    if path.is_dir() {
        return path.join(DIR_RECORD_FILE).is_file();
    }
    if path.exists() {
        return true;
    }
    PAYLOAD_SUFFIXES.iter().any(|suffix| {
        let mut with_suffix = OsString::from(path.as_os_str());
        with_suffix.push(suffix);
        Path::new(&with_suffix).exists()
    })
}
