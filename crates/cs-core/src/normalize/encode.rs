//! Per-role categorical encodings.

use std::collections::HashMap;

/// Label encoder fit on a single column.
///
/// Codes are assigned `0..N` in order of first observation, so they depend
/// on the batch and are not stable across runs with different data.
#[derive(Debug, Default)]
pub struct LabelEncoder {
    codes: HashMap<String, usize>,
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code for `label`, assigning the next free code on first sight.
    pub fn encode(&mut self, label: &str) -> usize {
        if let Some(code) = self.codes.get(label) {
            return *code;
        }
        let code = self.classes.len();
        self.codes.insert(label.to_string(), code);
        self.classes.push(label.to_string());
        code
    }

    /// Fit on and transform a whole column.
    pub fn fit_transform<'a>(labels: impl IntoIterator<Item = &'a str>) -> (Vec<f64>, Vec<String>) {
        let mut encoder = Self::new();
        let codes = labels
            .into_iter()
            .map(|l| encoder.encode(l) as f64)
            .collect();
        (codes, encoder.classes)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Ordinal code point of the first character, NaN when there is none.
pub fn first_code_point(cell: Option<&str>) -> f64 {
    cell.and_then(|s| s.chars().next())
        .map(|c| u32::from(c) as f64)
        .unwrap_or(f64::NAN)
}

/// Canonical label for a numeric category value: integral values print
/// without a fractional part so `1` and `1.0` share a code.
pub fn numeric_label(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_observation_order() {
        let (codes, classes) = LabelEncoder::fit_transform(["Y", "N", "Y", "U", "N"]);
        assert_eq!(codes, vec![0.0, 1.0, 0.0, 2.0, 1.0]);
        assert_eq!(classes, vec!["Y", "N", "U"]);
    }

    #[test]
    fn test_codes_dense() {
        let (codes, classes) = LabelEncoder::fit_transform(["a", "b", "c", "a"]);
        assert_eq!(classes.len(), 3);
        assert!(codes.iter().all(|c| *c >= 0.0 && *c < 3.0));
    }

    #[test]
    fn test_first_code_point() {
        assert_eq!(first_code_point(Some("4019")), 52.0);
        assert_eq!(first_code_point(Some("V5861")), 86.0);
        assert_eq!(first_code_point(Some("É1")), 201.0);
        assert!(first_code_point(Some("")).is_nan());
        assert!(first_code_point(None).is_nan());
    }

    #[test]
    fn test_numeric_label() {
        assert_eq!(numeric_label(1.0), "1");
        assert_eq!(numeric_label(-1.0), "-1");
        assert_eq!(numeric_label(2.5), "2.5");
    }
}
