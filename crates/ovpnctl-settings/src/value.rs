//! Typed setting values
//!
//! Every value is persisted as UTF-8 text. Decoding probes, in order:
//! integer, float, the literals `true`/`false` (any case), and finally
//! falls back to the raw string. Encoding is the exact inverse, so a
//! decoded value always re-encodes to text that decodes to the same value.

use std::fmt;

/// Delimiter used when a list is flattened into a single stored string
pub const LIST_DELIMITER: char = ',';

/// A single typed setting value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Integral number
    Int(i64),
    /// Non-integral number
    Float(f64),
    /// Boolean, stored as `true`/`false`
    Bool(bool),
    /// Anything else, passed through unchanged
    Text(String),
    /// Request-side list; flattened to `Text` before it reaches storage
    List(Vec<String>),
}

impl Value {
    /// Decode persisted text into a typed value
    pub fn decode(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        Value::Text(text.to_string())
    }

    /// Encode into the text form written to storage
    pub fn encode(&self) -> String {
        match self {
            Value::Int(i) => i.to_string(),
            // Debug keeps the fractional part ("1.0") so the text stays a float
            Value::Float(f) => format!("{:?}", f),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::Text(s) => s.clone(),
            Value::List(items) => join_list(items),
        }
    }

    /// Convert a request-side list into its stored form
    pub fn flatten(self) -> Self {
        match self {
            Value::List(items) => Value::Text(join_list(&items)),
            other => other,
        }
    }

    /// Truthiness used wherever a setting gates a directive
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i > 0,
            Value::Float(f) => *f > 0.0,
            Value::Text(s) => text_is_true(s),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Text view of the value (numbers and booleans rendered as stored)
    pub fn as_text(&self) -> String {
        self.encode()
    }

    /// Split a stored list value back into its items; empty text is an empty list
    pub fn split_list(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.clone(),
            other => {
                let text = other.encode();
                if text.is_empty() {
                    Vec::new()
                } else {
                    text.split(LIST_DELIMITER).map(str::to_string).collect()
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}

/// Lenient boolean parse for operator input: positive numbers, `true`, `yes`, `1`
pub fn text_is_true(text: &str) -> bool {
    let text = text.trim();
    if let Ok(f) = text.parse::<f64>() {
        return f > 0.0;
    }
    matches!(text.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

fn join_list(items: &[String]) -> String {
    items.join(&LIST_DELIMITER.to_string())
}
