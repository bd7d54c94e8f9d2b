#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use sb_groupby::SummaryRecord;
use sb_types::{NullKind, Row, Scalar};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("workbook json must be an object of sheet name to row array")]
    NotAWorkbook,
    #[error("sheet {sheet:?} must be an array of rows")]
    SheetNotArray { sheet: String },
    #[error("unsupported input {path:?} (expected a .json workbook, a .csv sheet or a directory)")]
    UnsupportedInput { path: PathBuf },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Named sheets of decoded rows. A sheet that was never loaded reads as
/// absent, which callers treat as an empty dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: BTreeMap<String, Vec<Row>>,
}

impl Workbook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sheet(&mut self, name: impl Into<String>, rows: Vec<Row>) {
        self.sheets.insert(name.into(), rows);
    }

    #[must_use]
    pub fn with_sheet(mut self, name: impl Into<String>, rows: Vec<Row>) -> Self {
        self.insert_sheet(name, rows);
        self
    }

    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&[Row]> {
        self.sheets.get(name).map(Vec::as_slice)
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    #[must_use]
    pub fn total_rows(&self) -> usize {
        self.sheets.values().map(Vec::len).sum()
    }
}

// ── CSV sheets ─────────────────────────────────────────────────────────

pub fn read_sheet_csv_str(input: &str) -> Result<Vec<Row>, IoError> {
    // Spreadsheet exports are often ragged, so short rows are accepted.
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned()?;
    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Row::with_capacity(headers.len());
        for (idx, name) in headers.iter().enumerate() {
            if let Some(field) = record.get(idx) {
                row.insert(name, csv_cell(field));
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

pub fn read_sheet_csv_path(path: &Path) -> Result<Vec<Row>, IoError> {
    let input = fs::read_to_string(path)?;
    let rows = read_sheet_csv_str(&input)?;
    debug!(path = %path.display(), rows = rows.len(), "read csv sheet");
    Ok(rows)
}

/// Every `*.csv` file in `dir` becomes a sheet named after its file stem.
pub fn read_workbook_dir(dir: &Path) -> Result<Workbook, IoError> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let mut workbook = Workbook::new();
    for path in paths {
        if !path.is_file() || !has_extension(&path, "csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "skipping csv with non-utf8 name");
            continue;
        };
        let rows = read_sheet_csv_path(&path)?;
        workbook.insert_sheet(stem, rows);
    }

    info!(
        dir = %dir.display(),
        sheets = workbook.len(),
        rows = workbook.total_rows(),
        "loaded workbook directory"
    );
    Ok(workbook)
}

/// A CSV cell keeps its literal text; only blank cells become null. Numeric
/// fields are parsed later by the row model, so `007` stays distinct from `7`.
fn csv_cell(field: &str) -> Scalar {
    if field.trim().is_empty() {
        Scalar::Null(NullKind::Null)
    } else {
        Scalar::Utf8(field.to_owned())
    }
}

// ── JSON workbooks ─────────────────────────────────────────────────────

/// Parse `{ "Sheet1": [ {..}, .. ], .. }`.
pub fn read_workbook_json_str(input: &str) -> Result<Workbook, IoError> {
    let Value::Object(sheets) = serde_json::from_str::<Value>(input)? else {
        return Err(IoError::NotAWorkbook);
    };

    let mut workbook = Workbook::new();
    for (name, value) in sheets {
        let Value::Array(items) = value else {
            return Err(IoError::SheetNotArray { sheet: name });
        };

        let mut rows = Vec::with_capacity(items.len());
        for (pos, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(cells) => rows.push(
                    cells
                        .iter()
                        .map(|(column, cell)| (column.as_str(), scalar_from_json(cell)))
                        .collect::<Row>(),
                ),
                other => {
                    warn!(sheet = %name, row = pos, found = %other, "skipping non-object row");
                }
            }
        }
        workbook.insert_sheet(name, rows);
    }

    Ok(workbook)
}

pub fn read_workbook_json_path(path: &Path) -> Result<Workbook, IoError> {
    let input = fs::read_to_string(path)?;
    let workbook = read_workbook_json_str(&input)?;
    info!(
        path = %path.display(),
        sheets = workbook.len(),
        rows = workbook.total_rows(),
        "loaded workbook json"
    );
    Ok(workbook)
}

fn scalar_from_json(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null(NullKind::Null),
        Value::Bool(v) => Scalar::Bool(*v),
        Value::Number(n) => match n.as_i64() {
            Some(v) => Scalar::Int64(v),
            None => n
                .as_f64()
                .map_or(Scalar::Null(NullKind::NaN), Scalar::Float64),
        },
        Value::String(v) => Scalar::Utf8(v.clone()),
        nested @ (Value::Array(_) | Value::Object(_)) => Scalar::Utf8(nested.to_string()),
    }
}

/// Load a workbook from a directory of sheet CSVs, a `.json` workbook, or a
/// single `.csv` file which becomes the sheet `csv_sheet`.
pub fn read_workbook_path(path: &Path, csv_sheet: &str) -> Result<Workbook, IoError> {
    if path.is_dir() {
        return read_workbook_dir(path);
    }
    if has_extension(path, "json") {
        return read_workbook_json_path(path);
    }
    if has_extension(path, "csv") {
        let rows = read_sheet_csv_path(path)?;
        return Ok(Workbook::new().with_sheet(csv_sheet, rows));
    }
    Err(IoError::UnsupportedInput {
        path: path.to_path_buf(),
    })
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

// ── Summary output ─────────────────────────────────────────────────────

pub fn write_summary_csv_string(
    summaries: &[SummaryRecord],
    key_header: &str,
    metric_header: &str,
) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record([key_header, metric_header])?;

    for record in summaries {
        writer.write_record([record.key.label(), record.metric.to_string()])?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}
