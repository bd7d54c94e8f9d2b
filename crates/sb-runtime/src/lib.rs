#![forbid(unsafe_code)]

//! Runtime policy, coercion diagnostics and logging setup shared by the
//! salesboard crates.
//!
//! Decoding and aggregation never fail on ragged input. Every place where a
//! value silently degrades (a missing cell, a non-numeric measure, an absent
//! sheet, a non-positive limit) is instead recorded in a [`CoercionLedger`],
//! and the [`RuntimePolicy`] decides afterwards whether the run is acceptable.

use std::collections::BTreeMap;

use sb_types::CoercionIssue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    #[default]
    Lenient,
    Strict,
}

impl std::str::FromStr for RuntimeMode {
    type Err = RuntimeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(RuntimeError::UnknownMode(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Allow,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingField,
    NonNumericValue,
    MissingDataset,
    NonPositiveLimit,
}

impl From<CoercionIssue> for IssueKind {
    fn from(issue: CoercionIssue) -> Self {
        match issue {
            CoercionIssue::MissingField => Self::MissingField,
            CoercionIssue::NonNumericValue => Self::NonNumericValue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionRecord {
    pub kind: IssueKind,
    pub dataset: String,
    /// Zero-based row position within the dataset, when the issue is per-row.
    pub row: Option<usize>,
    pub subject: String,
}

impl CoercionRecord {
    #[must_use]
    pub fn for_field(
        kind: IssueKind,
        dataset: impl Into<String>,
        row: usize,
        column: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            dataset: dataset.into(),
            row: Some(row),
            subject: column.into(),
        }
    }

    #[must_use]
    pub fn for_dataset(
        kind: IssueKind,
        dataset: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            dataset: dataset.into(),
            row: None,
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionLedger {
    records: Vec<CoercionRecord>,
}

impl CoercionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: CoercionRecord) {
        debug!(
            kind = ?record.kind,
            dataset = %record.dataset,
            row = ?record.row,
            subject = %record.subject,
            "coercion fallback"
        );
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[CoercionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn count_by_kind(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.kind).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimePolicy {
    pub mode: RuntimeMode,
}

impl RuntimePolicy {
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            mode: RuntimeMode::Lenient,
        }
    }

    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: RuntimeMode::Strict,
        }
    }

    /// Strict mode rejects any run that needed a fallback; lenient mode
    /// always allows.
    #[must_use]
    pub fn decide(&self, ledger: &CoercionLedger) -> DecisionAction {
        match self.mode {
            RuntimeMode::Strict if !ledger.is_empty() => DecisionAction::Reject,
            _ => DecisionAction::Allow,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("unknown runtime mode {0:?} (expected lenient or strict)")]
    UnknownMode(String),
}

/// Install a stderr `fmt` subscriber. `RUST_LOG` wins over `default_level`.
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
