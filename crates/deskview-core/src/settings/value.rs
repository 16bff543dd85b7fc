//! Setting values and boolean coercion

use core::fmt;
use serde::{Deserialize, Serialize};

/// A setting value as stored or supplied by any layer
///
/// Persisted layers may hand back strings for values that were written as
/// booleans or numbers, so consumers go through the typed accessors rather
/// than matching on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Boolean view of the value
    ///
    /// `"0"`, `"no"` and `"false"` (any case) and the number zero are false;
    /// everything else is true.
    pub fn coerce_bool(&self) -> bool {
        match self {
            SettingValue::Bool(b) => *b,
            SettingValue::Number(n) => *n != 0.0,
            SettingValue::Text(s) => {
                let s = s.trim();
                !(s == "0" || s.eq_ignore_ascii_case("no") || s.eq_ignore_ascii_case("false"))
            }
        }
    }

    /// Numeric view of the value, parsing text when needed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SettingValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            SettingValue::Number(n) => Some(*n),
            SettingValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Text view of the value
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, SettingValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(b) => write!(f, "{}", b),
            SettingValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            SettingValue::Number(n) => write!(f, "{}", n),
            SettingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        SettingValue::Bool(value)
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        SettingValue::Number(value)
    }
}

impl From<u16> for SettingValue {
    fn from(value: u16) -> Self {
        SettingValue::Number(f64::from(value))
    }
}

impl From<u32> for SettingValue {
    fn from(value: u32) -> Self {
        SettingValue::Number(f64::from(value))
    }
}

impl From<i32> for SettingValue {
    fn from(value: i32) -> Self {
        SettingValue::Number(f64::from(value))
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        SettingValue::Text(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        SettingValue::Text(value)
    }
}
