#![forbid(unsafe_code)]

use std::{cmp::Ordering, fmt, str::FromStr};

use sb_groupby::SummaryRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ascending => "ascending",
            Self::Descending => "descending",
        })
    }
}

impl FromStr for SortOrder {
    type Err = ParseRankError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(ParseRankError {
                what: "sort order",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    #[default]
    Top,
    Bottom,
    All,
}

impl View {
    /// The order the dashboard pairs with this view: Top shows the largest
    /// metrics first, Bottom the smallest.
    #[must_use]
    pub fn default_order(self) -> SortOrder {
        match self {
            Self::Top | Self::All => SortOrder::Descending,
            Self::Bottom => SortOrder::Ascending,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Top => "top",
            Self::Bottom => "bottom",
            Self::All => "all",
        })
    }
}

impl FromStr for View {
    type Err = ParseRankError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(Self::Top),
            "bottom" => Ok(Self::Bottom),
            "all" => Ok(Self::All),
            other => Err(ParseRankError {
                what: "view",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {what} {value:?}")]
pub struct ParseRankError {
    what: &'static str,
    value: String,
}

/// The parameters of one ranked view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRequest {
    pub order: SortOrder,
    pub view: View,
    pub limit: usize,
}

impl RankRequest {
    /// A request with the view's paired order and the default limit.
    #[must_use]
    pub fn for_view(view: View) -> Self {
        Self {
            order: view.default_order(),
            view,
            limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Limit from a signed source (config file, CLI). Negative becomes `0`.
    #[must_use]
    pub fn with_signed_limit(self, limit: i64) -> Self {
        self.with_limit(usize::try_from(limit).unwrap_or(0))
    }

    #[must_use]
    pub fn apply(&self, summaries: &[SummaryRecord]) -> Vec<SummaryRecord> {
        rank(summaries, self.order, self.view, self.limit)
    }
}

impl Default for RankRequest {
    fn default() -> Self {
        Self::for_view(View::Top)
    }
}

fn compare_metrics(left: f64, right: f64, order: SortOrder) -> Ordering {
    let ord = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
    match order {
        SortOrder::Ascending => ord,
        SortOrder::Descending => ord.reverse(),
    }
}

/// Sort by metric and cut to `limit`.
///
/// The sort is stable, so records with equal metrics keep their input
/// order. `View::All` ignores `limit`; `Top` and `Bottom` take the first
/// `limit` records of the sorted sequence, which is empty for a limit of 0.
/// The input is never modified.
#[must_use]
pub fn rank(
    summaries: &[SummaryRecord],
    order: SortOrder,
    view: View,
    limit: usize,
) -> Vec<SummaryRecord> {
    let take = match view {
        View::All => summaries.len(),
        View::Top | View::Bottom => limit.min(summaries.len()),
    };
    if take == 0 {
        return Vec::new();
    }

    let mut positions = (0..summaries.len()).collect::<Vec<_>>();
    positions.sort_by(|&left, &right| {
        compare_metrics(summaries[left].metric, summaries[right].metric, order)
    });
    positions.truncate(take);

    positions
        .into_iter()
        .map(|pos| summaries[pos].clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartSeries {
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Bar-chart series. Top and Bottom use their paired order and `limit`;
/// All plots every summary in aggregation order.
#[must_use]
pub fn chart_series(summaries: &[SummaryRecord], view: View, limit: usize) -> ChartSeries {
    let selected = match view {
        View::All => summaries.to_vec(),
        View::Top | View::Bottom => rank(summaries, view.default_order(), view, limit),
    };

    ChartSeries {
        labels: selected.iter().map(|record| record.key.label()).collect(),
        values: selected.iter().map(|record| record.metric).collect(),
    }
}
