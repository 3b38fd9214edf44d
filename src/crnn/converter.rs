use std::fs;
use std::path::Path;

use crate::error::PredictError;

/// Index reserved for the CTC blank symbol.
pub const BLANK_INDEX: usize = 0;

/// Maps CTC class indices to alphabet characters.
///
/// Class 0 is the blank; class `i > 0` is `alphabet[i - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConverter {
    alphabet: Vec<char>,
}

impl LabelConverter {
    pub fn new(alphabet: &str) -> Result<Self, PredictError> {
        let alphabet: Vec<char> = alphabet.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        if alphabet.is_empty() {
            return Err(PredictError::EmptyAlphabet);
        }
        Ok(LabelConverter { alphabet })
    }

    /// Load an alphabet stored as UTF-8 text; line breaks are ignored.
    pub fn from_file(path: &Path) -> Result<Self, PredictError> {
        let content = fs::read_to_string(path).map_err(|e| PredictError::AlphabetRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::new(&content)
    }

    /// Number of output classes, including the blank.
    pub fn num_classes(&self) -> usize {
        self.alphabet.len() + 1
    }

    /// Greedy CTC decoding: collapse repeated classes, then drop blanks.
    pub fn decode(&self, classes: &[usize]) -> String {
        let mut text = String::with_capacity(classes.len());
        let mut prev = None;
        for &class in classes {
            if class != BLANK_INDEX && prev != Some(class) {
                if let Some(&c) = self.alphabet.get(class - 1) {
                    text.push(c);
                }
            }
            prev = Some(class);
        }
        text
    }

    /// Decode row-major `[timesteps, num_classes]` scores by taking the
    /// best class at each timestep.
    pub fn decode_scores(&self, scores: &[f32], num_classes: usize) -> String {
        if num_classes == 0 {
            return String::new();
        }
        let classes: Vec<usize> = scores.chunks(num_classes).map(argmax).collect();
        self.decode(&classes)
    }
}

fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digits() -> LabelConverter {
        LabelConverter::new("0123456789").unwrap()
    }

    #[test]
    fn test_num_classes_includes_blank() {
        assert_eq!(digits().num_classes(), 11);
    }

    #[test]
    fn test_decode_collapses_repeats_and_drops_blanks() {
        // classes: 2 2 0 2 3 3 0 0 -> "1" "1" "2"
        let text = digits().decode(&[2, 2, 0, 2, 3, 3, 0, 0]);
        assert_eq!(text, "112");
    }

    #[test]
    fn test_decode_ignores_out_of_range_classes() {
        assert_eq!(digits().decode(&[1, 42, 10]), "09");
    }

    #[test]
    fn test_decode_scores_uses_argmax_per_timestep() {
        let converter = LabelConverter::new("ab").unwrap();
        #[rustfmt::skip]
        let scores = [
            0.1, 0.8, 0.1, // a
            0.1, 0.7, 0.2, // a (repeat)
            0.9, 0.0, 0.1, // blank
            0.0, 0.2, 0.8, // b
        ];
        assert_eq!(converter.decode_scores(&scores, 3), "ab");
    }

    #[test]
    fn test_empty_alphabet_is_rejected() {
        assert!(matches!(
            LabelConverter::new("\n"),
            Err(PredictError::EmptyAlphabet)
        ));
    }

    #[test]
    fn test_from_file_strips_line_breaks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alphabet.txt");
        fs::write(&path, "abc\r\n").unwrap();
        let converter = LabelConverter::from_file(&path).unwrap();
        assert_eq!(converter.num_classes(), 4);
        assert_eq!(converter.decode(&[3, 2, 1]), "cba");
    }
}
