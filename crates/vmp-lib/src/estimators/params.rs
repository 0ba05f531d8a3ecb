//! Hyperparameter values shared by all estimator families

use crate::error::{PlacementError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(usize),
    Float(f64),
    Text(String),
    None,
}

impl ParamValue {
    pub fn text(value: impl Into<String>) -> Self {
        ParamValue::Text(value.into())
    }

    pub fn opt_int(value: Option<usize>) -> Self {
        value.map(ParamValue::Int).unwrap_or(ParamValue::None)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
            ParamValue::None => write!(f, "None"),
        }
    }
}

fn invalid(name: &str, value: &ParamValue, expected: &str) -> PlacementError {
    PlacementError::Config(format!(
        "parameter {} expects {}, got {}",
        name, expected, value
    ))
}

pub(crate) fn as_usize(name: &str, value: &ParamValue) -> Result<usize> {
    match value {
        ParamValue::Int(v) => Ok(*v),
        other => Err(invalid(name, other, "an integer")),
    }
}

pub(crate) fn as_opt_usize(name: &str, value: &ParamValue) -> Result<Option<usize>> {
    match value {
        ParamValue::Int(v) => Ok(Some(*v)),
        ParamValue::None => Ok(None),
        other => Err(invalid(name, other, "an integer or None")),
    }
}

pub(crate) fn as_f64(name: &str, value: &ParamValue) -> Result<f64> {
    match value {
        ParamValue::Float(v) => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        other => Err(invalid(name, other, "a number")),
    }
}

pub(crate) fn as_text<'a>(name: &str, value: &'a ParamValue) -> Result<&'a str> {
    match value {
        ParamValue::Text(v) => Ok(v.as_str()),
        other => Err(invalid(name, other, "a string")),
    }
}

pub(crate) fn unknown_param(family: &str, name: &str) -> PlacementError {
    PlacementError::Config(format!("{} has no parameter named {}", family, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_roundtrip_shapes() {
        let values = vec![
            ParamValue::Int(5),
            ParamValue::Float(0.1),
            ParamValue::text("scale"),
            ParamValue::None,
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[5,0.1,"scale",null]"#);
        let back: Vec<ParamValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(as_usize("k", &ParamValue::Int(3)).unwrap(), 3);
        assert!(as_usize("k", &ParamValue::Float(3.0)).is_err());
        assert_eq!(as_opt_usize("d", &ParamValue::None).unwrap(), None);
        assert_eq!(as_f64("c", &ParamValue::Int(10)).unwrap(), 10.0);
        assert!(as_text("w", &ParamValue::Int(1)).is_err());
    }
}
