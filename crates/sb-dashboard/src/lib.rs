#![forbid(unsafe_code)]

//! Dashboard assembly: decode each dataset of a workbook, aggregate it,
//! rank it per its configured view, and collect the panels plus the sales
//! chart into one serializable report.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use sb_groupby::{
    GroupKey, MiscColumn, SummaryRecord, customers_by_segment, dates_by_year_month, grand_total,
    misc_by_column, products_by_category, sales_by_city,
};
use sb_io::{IoError, Workbook, read_workbook_path, write_summary_csv_string};
use sb_model::{Customer, DatasetKind, DateEntry, MiscEntry, Product, Sale, decode_rows};
use sb_rank::{ChartSeries, DEFAULT_LIMIT, RankRequest, SortOrder, View, chart_series};
use sb_runtime::{
    CoercionLedger, CoercionRecord, DecisionAction, IssueKind, RuntimeMode, RuntimePolicy,
};
use sb_types::Row;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const ENV_LIMIT: &str = "SALESBOARD_LIMIT";
pub const ENV_MODE: &str = "SALESBOARD_MODE";
pub const ENV_LOG: &str = "SALESBOARD_LOG";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub sheet: String,
    pub order: SortOrder,
    pub view: View,
}

/// A dataset entry as written in a config file. Absent fields fall back to
/// the defaults of the dataset the entry is keyed under.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DatasetEntry {
    sheet: Option<String>,
    order: Option<SortOrder>,
    view: Option<View>,
}

impl DatasetEntry {
    fn resolve(self, kind: DatasetKind) -> DatasetConfig {
        let base = DatasetConfig::for_kind(kind);
        DatasetConfig {
            sheet: self.sheet.unwrap_or(base.sheet),
            order: self.order.unwrap_or(base.order),
            view: self.view.unwrap_or(base.view),
        }
    }
}

fn deserialize_datasets<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<DatasetKind, DatasetConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = BTreeMap::<DatasetKind, DatasetEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|(kind, entry)| (kind, entry.resolve(kind)))
        .collect())
}

impl DatasetConfig {
    #[must_use]
    pub fn for_kind(kind: DatasetKind) -> Self {
        Self {
            sheet: kind.default_sheet().to_owned(),
            order: SortOrder::Descending,
            view: View::Top,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Rows per ranked view. Zero or negative yields empty views.
    pub limit: i64,
    pub chart_view: View,
    pub misc_column: MiscColumn,
    pub mode: RuntimeMode,
    pub log_level: String,
    #[serde(deserialize_with = "deserialize_datasets")]
    pub datasets: BTreeMap<DatasetKind, DatasetConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT as i64,
            chart_view: View::Top,
            misc_column: MiscColumn::Column1,
            mode: RuntimeMode::Lenient,
            log_level: "info".to_owned(),
            datasets: DatasetKind::ALL
                .iter()
                .map(|&kind| (kind, DatasetConfig::for_kind(kind)))
                .collect(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&input)
    }

    /// Settings for one dataset; datasets absent from the file use their
    /// stock sheet with Descending/Top.
    #[must_use]
    pub fn dataset(&self, kind: DatasetKind) -> DatasetConfig {
        self.datasets
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| DatasetConfig::for_kind(kind))
    }

    #[must_use]
    pub fn rank_request(&self, kind: DatasetKind) -> RankRequest {
        let dataset = self.dataset(kind);
        RankRequest::for_view(dataset.view)
            .with_order(dataset.order)
            .with_signed_limit(self.limit)
    }

    #[must_use]
    pub fn policy(&self) -> RuntimePolicy {
        RuntimePolicy { mode: self.mode }
    }

    /// Apply a view to every dataset and the chart. Without an explicit
    /// order, each dataset takes the view's paired order.
    pub fn set_view(&mut self, view: View, order: Option<SortOrder>) {
        self.chart_view = view;
        for kind in DatasetKind::ALL {
            let mut dataset = self.dataset(kind);
            dataset.view = view;
            dataset.order = order.unwrap_or_else(|| view.default_order());
            self.datasets.insert(kind, dataset);
        }
    }

    pub fn set_order(&mut self, order: SortOrder) {
        for kind in DatasetKind::ALL {
            let mut dataset = self.dataset(kind);
            dataset.order = order;
            self.datasets.insert(kind, dataset);
        }
    }

    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SALESBOARD_*` overrides from `lookup`, logging and ignoring
    /// unparseable values.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for rejected in self.apply_overrides(lookup) {
            warn!(key = rejected.key, value = %rejected.value, "{rejected}");
        }
        self
    }

    /// Apply `SALESBOARD_*` overrides from `lookup` and hand back the ones
    /// that did not parse, for callers that log them once tracing is up.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Vec<InvalidOverride> {
        let mut rejected = Vec::new();
        if let Some(value) = lookup(ENV_LIMIT) {
            match value.trim().parse::<i64>() {
                Ok(limit) => self.limit = limit,
                Err(err) => rejected.push(InvalidOverride::new(ENV_LIMIT, value, err)),
            }
        }
        if let Some(value) = lookup(ENV_MODE) {
            match value.parse::<RuntimeMode>() {
                Ok(mode) => self.mode = mode,
                Err(err) => rejected.push(InvalidOverride::new(ENV_MODE, value, err)),
            }
        }
        if let Some(value) = lookup(ENV_LOG)
            && !value.trim().is_empty()
        {
            self.log_level = value.trim().to_owned();
        }
        rejected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ignoring invalid override {key}={value:?}: {reason}")]
pub struct InvalidOverride {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

impl InvalidOverride {
    fn new(key: &'static str, value: String, reason: impl std::fmt::Display) -> Self {
        Self {
            key,
            value,
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("strict mode rejected the workbook: {fallbacks} coercion fallback(s)")]
    CoercionRejected { fallbacks: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub key: GroupKey,
    pub metric: f64,
}

impl From<&SummaryRecord> for ReportRow {
    fn from(record: &SummaryRecord) -> Self {
        Self {
            label: record.key.label(),
            key: record.key.clone(),
            metric: record.metric,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    pub dataset: DatasetKind,
    pub title: String,
    pub key_header: String,
    pub metric_header: String,
    pub request: RankRequest,
    pub row_count: usize,
    pub group_count: usize,
    pub grand_total: f64,
    pub ranked: Vec<ReportRow>,
    /// Full unranked summary set, in aggregation order.
    pub summaries: Vec<SummaryRecord>,
}

impl Panel {
    /// The ranked view as `key,metric` CSV under this panel's headers.
    pub fn ranked_csv(&self) -> Result<String, IoError> {
        write_summary_csv_string(
            &self.request.apply(&self.summaries),
            &self.key_header,
            &self.metric_header,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardReport {
    pub panels: Vec<Panel>,
    pub chart_view: View,
    pub chart: ChartSeries,
    pub diagnostics: CoercionLedger,
}

impl DashboardReport {
    #[must_use]
    pub fn panel(&self, kind: DatasetKind) -> Option<&Panel> {
        self.panels.iter().find(|panel| panel.dataset == kind)
    }
}

fn panel_labels(kind: DatasetKind, misc_column: MiscColumn) -> (&'static str, &'static str, &'static str) {
    match kind {
        DatasetKind::Sales => ("Sales by City", "City", "Total Sales"),
        DatasetKind::Products => ("Products by Category", "Category", "Count"),
        DatasetKind::Customers => ("Customers by Segment", "Segment", "Count"),
        DatasetKind::Dates => ("Dates by Year and Month", "Year-Month", "Count"),
        DatasetKind::Misc => match misc_column {
            MiscColumn::Column1 => ("Misc by Column1", "Column1", "Count"),
            MiscColumn::Column2 => ("Misc by Column2", "Column2", "Count"),
        },
    }
}

fn summarize(
    kind: DatasetKind,
    rows: &[Row],
    misc_column: MiscColumn,
    ledger: &mut CoercionLedger,
) -> Vec<SummaryRecord> {
    match kind {
        DatasetKind::Sales => sales_by_city(&decode_rows::<Sale>(rows, ledger)),
        DatasetKind::Products => products_by_category(&decode_rows::<Product>(rows, ledger)),
        DatasetKind::Customers => customers_by_segment(&decode_rows::<Customer>(rows, ledger)),
        DatasetKind::Dates => dates_by_year_month(&decode_rows::<DateEntry>(rows, ledger)),
        DatasetKind::Misc => misc_by_column(&decode_rows::<MiscEntry>(rows, ledger), misc_column),
    }
}

/// Build the full report for `workbook`.
///
/// Missing sheets produce empty panels and a `MissingDataset` diagnostic; a
/// non-positive limit produces empty ranked views and a `NonPositiveLimit`
/// diagnostic. Only strict mode turns diagnostics into an error.
pub fn assemble(
    workbook: &Workbook,
    config: &DashboardConfig,
) -> Result<DashboardReport, DashboardError> {
    let mut ledger = CoercionLedger::new();

    if config.limit <= 0 {
        ledger.push(CoercionRecord::for_dataset(
            IssueKind::NonPositiveLimit,
            "*",
            format!("limit={}", config.limit),
        ));
    }

    let mut panels = Vec::with_capacity(DatasetKind::ALL.len());
    for kind in DatasetKind::ALL {
        let dataset = config.dataset(kind);
        let rows: &[Row] = match workbook.sheet(&dataset.sheet) {
            Some(rows) => rows,
            None => {
                warn!(dataset = %kind, sheet = %dataset.sheet, "sheet missing, treating as empty");
                ledger.push(CoercionRecord::for_dataset(
                    IssueKind::MissingDataset,
                    kind.name(),
                    dataset.sheet.as_str(),
                ));
                &[]
            }
        };

        let summaries = summarize(kind, rows, config.misc_column, &mut ledger);
        let request = config.rank_request(kind);
        let ranked = request.apply(&summaries);
        let (title, key_header, metric_header) = panel_labels(kind, config.misc_column);

        panels.push(Panel {
            dataset: kind,
            title: title.to_owned(),
            key_header: key_header.to_owned(),
            metric_header: metric_header.to_owned(),
            request,
            row_count: rows.len(),
            group_count: summaries.len(),
            grand_total: grand_total(&summaries),
            ranked: ranked.iter().map(ReportRow::from).collect(),
            summaries,
        });
    }

    let chart_limit = usize::try_from(config.limit).unwrap_or(0);
    let chart = panels
        .iter()
        .find(|panel| panel.dataset == DatasetKind::Sales)
        .map(|panel| chart_series(&panel.summaries, config.chart_view, chart_limit))
        .unwrap_or_default();

    info!(
        panels = panels.len(),
        rows = workbook.total_rows(),
        fallbacks = ledger.len(),
        mode = ?config.mode,
        "assembled dashboard"
    );

    if config.policy().decide(&ledger) == DecisionAction::Reject {
        return Err(DashboardError::CoercionRejected {
            fallbacks: ledger.len(),
        });
    }

    Ok(DashboardReport {
        panels,
        chart_view: config.chart_view,
        chart,
        diagnostics: ledger,
    })
}

/// Load the workbook at `path`. A lone CSV file becomes the sales sheet.
pub fn load_workbook(path: &Path, config: &DashboardConfig) -> Result<Workbook, DashboardError> {
    let sales_sheet = config.dataset(DatasetKind::Sales).sheet;
    Ok(read_workbook_path(path, &sales_sheet)?)
}

// ---------------------------------------------------------------------------
// Text rendering
// ---------------------------------------------------------------------------

const CHART_WIDTH: usize = 40;

#[must_use]
pub fn format_metric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn describe_request(request: &RankRequest) -> String {
    match request.view {
        View::All => format!("all, {}", request.order),
        View::Top | View::Bottom => {
            format!("{} {}, {}", request.view, request.limit, request.order)
        }
    }
}

fn render_panel(out: &mut String, panel: &Panel) {
    let key_width = panel
        .ranked
        .iter()
        .map(|row| row.label.chars().count())
        .chain([panel.key_header.chars().count(), "Grand Total".len()])
        .max()
        .unwrap_or(0);
    let metric_width = panel
        .ranked
        .iter()
        .map(|row| format_metric(row.metric).len())
        .chain([
            panel.metric_header.len(),
            format_metric(panel.grand_total).len(),
        ])
        .max()
        .unwrap_or(0);

    let _ = writeln!(out, "{} ({})", panel.title, describe_request(&panel.request));
    let _ = writeln!(
        out,
        "  {:<key_width$}  {:>metric_width$}",
        panel.key_header, panel.metric_header
    );
    let _ = writeln!(out, "  {}  {}", "-".repeat(key_width), "-".repeat(metric_width));
    for row in &panel.ranked {
        let _ = writeln!(
            out,
            "  {:<key_width$}  {:>metric_width$}",
            row.label,
            format_metric(row.metric)
        );
    }
    let _ = writeln!(
        out,
        "  {:<key_width$}  {:>metric_width$}",
        "Grand Total",
        format_metric(panel.grand_total)
    );
}

fn render_chart(out: &mut String, view: View, chart: &ChartSeries) {
    let _ = writeln!(out, "Sales by City chart ({view})");
    let label_width = chart
        .labels
        .iter()
        .map(|label| label.chars().count())
        .max()
        .unwrap_or(0);
    let peak = chart.values.iter().copied().fold(0.0_f64, f64::max);
    for (label, value) in chart.labels.iter().zip(&chart.values) {
        let bar = if peak > 0.0 && *value > 0.0 {
            ((value / peak) * CHART_WIDTH as f64).round().max(1.0) as usize
        } else {
            0
        };
        let _ = writeln!(
            out,
            "  {label:<label_width$} | {} {}",
            "#".repeat(bar),
            format_metric(*value)
        );
    }
}

/// Plain-text tables for every panel followed by the sales chart.
#[must_use]
pub fn render_text(report: &DashboardReport) -> String {
    let mut out = String::new();
    render_chart(&mut out, report.chart_view, &report.chart);
    for panel in &report.panels {
        out.push('\n');
        render_panel(&mut out, panel);
    }
    if !report.diagnostics.is_empty() {
        out.push('\n');
        let _ = writeln!(out, "Coercion fallbacks: {}", report.diagnostics.len());
        for (kind, count) in report.diagnostics.count_by_kind() {
            let _ = writeln!(out, "  {kind:?}: {count}");
        }
    }
    out
}
