//! Label encoding for categorical columns

use crate::error::{PlacementError, Result};
use serde::{Deserialize, Serialize};

/// Maps categorical values to dense integer codes
///
/// Classes are kept sorted so codes do not depend on row order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    column: String,
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit an encoder on the distinct values of a column
    pub fn fit<'a>(column: impl Into<String>, values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self {
            column: column.into(),
            classes,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Code reserved for values unseen at fit time
    pub fn reserved_code(&self) -> usize {
        self.classes.len()
    }

    pub fn transform(&self, value: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(value))
            .map_err(|_| PlacementError::UnknownCategory {
                column: self.column.clone(),
                value: value.to_string(),
            })
    }

    /// Encode a value, mapping unseen values to the reserved code
    ///
    /// Returns the code and whether the value was known.
    pub fn transform_or_reserved(&self, value: &str) -> (usize, bool) {
        match self.transform(value) {
            Ok(code) => (code, true),
            Err(_) => (self.reserved_code(), false),
        }
    }

    pub fn inverse_transform(&self, code: usize) -> Result<&str> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            PlacementError::UnknownCategory {
                column: self.column.clone(),
                value: code.to_string(),
            }
        })
    }

    /// Map a continuous model output to the nearest valid code
    ///
    /// Rounds half away from zero, then clamps into the fitted range.
    /// Non-finite values map to code 0.
    pub fn nearest_code(&self, value: f64) -> Result<usize> {
        if self.classes.is_empty() {
            return Err(PlacementError::NotTrained);
        }
        if !value.is_finite() {
            return Ok(0);
        }
        let max = (self.classes.len() - 1) as f64;
        Ok(value.round().clamp(0.0, max) as usize)
    }

    pub fn nearest_class(&self, value: f64) -> Result<&str> {
        let code = self.nearest_code(value)?;
        self.inverse_transform(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts() -> LabelEncoder {
        LabelEncoder::fit("host", ["Host3", "Host1", "Host2", "Host1"])
    }

    #[test]
    fn test_classes_sorted_and_deduped() {
        let enc = hosts();
        assert_eq!(enc.classes(), &["Host1", "Host2", "Host3"]);
        assert_eq!(enc.transform("Host2").unwrap(), 1);
        assert_eq!(enc.inverse_transform(2).unwrap(), "Host3");
    }

    #[test]
    fn test_unknown_value() {
        let enc = hosts();
        assert!(matches!(
            enc.transform("Host9"),
            Err(PlacementError::UnknownCategory { .. })
        ));
        assert_eq!(enc.transform_or_reserved("Host9"), (3, false));
        assert_eq!(enc.transform_or_reserved("Host1"), (0, true));
    }

    #[test]
    fn test_nearest_code_rounds_and_clamps() {
        let enc = hosts();
        assert_eq!(enc.nearest_code(0.49).unwrap(), 0);
        assert_eq!(enc.nearest_code(0.5).unwrap(), 1);
        assert_eq!(enc.nearest_code(1.7).unwrap(), 2);
        assert_eq!(enc.nearest_code(-3.2).unwrap(), 0);
        assert_eq!(enc.nearest_code(11.0).unwrap(), 2);
        assert_eq!(enc.nearest_code(f64::NAN).unwrap(), 0);
        assert_eq!(enc.nearest_class(1.2).unwrap(), "Host2");
    }

    #[test]
    fn test_empty_encoder_has_no_nearest() {
        let enc = LabelEncoder::fit("host", std::iter::empty());
        assert!(matches!(enc.nearest_code(1.0), Err(PlacementError::NotTrained)));
    }
}
