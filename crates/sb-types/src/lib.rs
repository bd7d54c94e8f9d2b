#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Null,
    NaN,
}

/// A single spreadsheet cell as handed over by the source decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

impl Scalar {
    #[must_use]
    pub fn dtype(&self) -> DType {
        match self {
            Self::Null(_) => DType::Null,
            Self::Bool(_) => DType::Bool,
            Self::Int64(_) => DType::Int64,
            Self::Float64(_) => DType::Float64,
            Self::Utf8(_) => DType::Utf8,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Utf8(v) => v.trim().is_empty(),
            other => other.is_missing(),
        }
    }

    /// Strict numeric view. Text is never parsed here; see [`coerce_number`]
    /// for the lenient path used by the record decoders.
    pub fn to_f64(&self) -> Result<f64, TypeError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null(kind) => Err(TypeError::ValueIsMissing { kind: *kind }),
            Self::Utf8(v) => Err(TypeError::NonNumericValue {
                value: v.clone(),
                dtype: DType::Utf8,
            }),
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("value {value:?} has non-numeric dtype {dtype:?}")]
    NonNumericValue { value: String, dtype: DType },
    #[error("value is missing ({kind:?})")]
    ValueIsMissing { kind: NullKind },
}

// ── Rows ───────────────────────────────────────────────────────────────

/// Ordered column name → cell mapping. Column order follows the source
/// header; a repeated column name replaces the earlier cell in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    cells: Vec<(String, Scalar)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self { cells: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        let column = column.into();
        let value = value.into();
        if let Some(slot) = self.cells.iter_mut().find(|(name, _)| *name == column) {
            slot.1 = value;
        } else {
            self.cells.push((column, value));
        }
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(column, value);
        self
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Self::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

// ── Lenient coercion ───────────────────────────────────────────────────

/// Why a coercion degraded to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionIssue {
    MissingField,
    NonNumericValue,
}

/// Result of a total coercion: always a usable value, plus the reason when
/// the value is a fallback default rather than the source cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Coerced<T> {
    pub value: T,
    pub issue: Option<CoercionIssue>,
}

impl<T> Coerced<T> {
    fn exact(value: T) -> Self {
        Self { value, issue: None }
    }

    fn fallback(value: T, issue: CoercionIssue) -> Self {
        Self {
            value,
            issue: Some(issue),
        }
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.issue.is_some()
    }
}

/// Numeric coercion. Missing, blank, unparseable and non-finite input all
/// become `0.0`.
#[must_use]
pub fn coerce_number(value: Option<&Scalar>) -> Coerced<f64> {
    let Some(value) = value else {
        return Coerced::fallback(0.0, CoercionIssue::MissingField);
    };

    let parsed = match value {
        Scalar::Null(_) => return Coerced::fallback(0.0, CoercionIssue::MissingField),
        Scalar::Float64(v) if v.is_nan() => {
            return Coerced::fallback(0.0, CoercionIssue::MissingField);
        }
        Scalar::Utf8(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Coerced::fallback(0.0, CoercionIssue::MissingField);
            }
            match trimmed.parse::<f64>() {
                Ok(v) => v,
                Err(_) => return Coerced::fallback(0.0, CoercionIssue::NonNumericValue),
            }
        }
        other => match other.to_f64() {
            Ok(v) => v,
            Err(_) => return Coerced::fallback(0.0, CoercionIssue::NonNumericValue),
        },
    };

    if parsed.is_finite() {
        Coerced::exact(parsed)
    } else {
        Coerced::fallback(0.0, CoercionIssue::NonNumericValue)
    }
}

/// Integer coercion on top of [`coerce_number`]. A fractional value
/// truncates and is reported as `NonNumericValue`.
#[must_use]
pub fn coerce_integer(value: Option<&Scalar>) -> Coerced<i64> {
    let number = coerce_number(value);
    let truncated = number.value.trunc() as i64;
    match number.issue {
        Some(issue) => Coerced::fallback(truncated, issue),
        None if number.value.fract() != 0.0 => {
            Coerced::fallback(truncated, CoercionIssue::NonNumericValue)
        }
        None => Coerced::exact(truncated),
    }
}

/// Text coercion. Missing becomes `""`; numbers use their shortest display
/// form, so `2024.0` renders as `"2024"`.
#[must_use]
pub fn coerce_text(value: Option<&Scalar>) -> Coerced<String> {
    match value {
        None | Some(Scalar::Null(_)) => {
            Coerced::fallback(String::new(), CoercionIssue::MissingField)
        }
        Some(Scalar::Float64(v)) if v.is_nan() => {
            Coerced::fallback(String::new(), CoercionIssue::MissingField)
        }
        Some(Scalar::Float64(v)) => Coerced::exact(v.to_string()),
        Some(Scalar::Int64(v)) => Coerced::exact(v.to_string()),
        Some(Scalar::Bool(v)) => Coerced::exact(v.to_string()),
        Some(Scalar::Utf8(v)) => Coerced::exact(v.clone()),
    }
}
