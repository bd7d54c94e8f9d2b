#![forbid(unsafe_code)]

//! Typed records for the five workbook datasets.
//!
//! Each record type decodes from a loose [`Row`] through total coercions:
//! a ragged or malformed row still yields a record, and every field that had
//! to fall back to its default is reported alongside it.

use std::fmt;

use sb_runtime::{CoercionLedger, CoercionRecord};
use sb_types::{CoercionIssue, Row, coerce_integer, coerce_number, coerce_text};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod columns {
    pub const CITY: &str = "City";
    pub const SALES: &str = "Sales";
    pub const ID: &str = "ID";
    pub const NAME: &str = "Name";
    pub const CATEGORY: &str = "Category";
    pub const SEGMENT: &str = "Segment";
    pub const MONTH_NAME: &str = "Month Name";
    pub const YEAR: &str = "Year";
    pub const COLUMN1: &str = "Column1";
    pub const COLUMN2: &str = "Column2";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Sales,
    Products,
    Customers,
    Dates,
    Misc,
}

impl DatasetKind {
    pub const ALL: [Self; 5] = [
        Self::Sales,
        Self::Products,
        Self::Customers,
        Self::Dates,
        Self::Misc,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Products => "products",
            Self::Customers => "customers",
            Self::Dates => "dates",
            Self::Misc => "misc",
        }
    }

    /// Sheet name used by the stock workbook layout.
    #[must_use]
    pub fn default_sheet(self) -> &'static str {
        match self {
            Self::Sales => "Sheet1",
            Self::Products => "Sheet2",
            Self::Customers => "Sheet3",
            Self::Dates => "Sheet4",
            Self::Misc => "Sheet5",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFallback {
    pub column: &'static str,
    pub issue: CoercionIssue,
}

/// Reads named fields off a row and remembers which ones degraded.
struct FieldReader<'a> {
    row: &'a Row,
    fallbacks: Vec<FieldFallback>,
}

impl<'a> FieldReader<'a> {
    fn new(row: &'a Row) -> Self {
        Self {
            row,
            fallbacks: Vec::new(),
        }
    }

    fn note(&mut self, column: &'static str, issue: Option<CoercionIssue>) {
        if let Some(issue) = issue {
            self.fallbacks.push(FieldFallback { column, issue });
        }
    }

    fn text(&mut self, column: &'static str) -> String {
        let out = coerce_text(self.row.get(column));
        self.note(column, out.issue);
        out.value
    }

    fn number(&mut self, column: &'static str) -> f64 {
        let out = coerce_number(self.row.get(column));
        self.note(column, out.issue);
        out.value
    }

    fn integer(&mut self, column: &'static str) -> i64 {
        let out = coerce_integer(self.row.get(column));
        self.note(column, out.issue);
        out.value
    }

    /// Descriptive fields are never aggregated, so their absence is not a
    /// fallback.
    fn optional_text(&self, column: &'static str) -> Option<String> {
        self.row
            .get(column)
            .filter(|value| !value.is_missing())
            .map(|value| coerce_text(Some(value)).value)
    }

    fn finish<T>(self, record: T) -> (T, Vec<FieldFallback>) {
        (record, self.fallbacks)
    }
}

pub trait RowRecord: Sized {
    const KIND: DatasetKind;

    /// Decode a record, returning the fields that fell back to defaults.
    fn decode(row: &Row) -> (Self, Vec<FieldFallback>);

    #[must_use]
    fn from_row(row: &Row) -> Self {
        Self::decode(row).0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    pub city: String,
    pub sales: f64,
}

impl RowRecord for Sale {
    const KIND: DatasetKind = DatasetKind::Sales;

    fn decode(row: &Row) -> (Self, Vec<FieldFallback>) {
        let mut fields = FieldReader::new(row);
        let city = fields.text(columns::CITY);
        let sales = fields.number(columns::SALES);
        fields.finish(Self { city, sales })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: String,
}

impl RowRecord for Product {
    const KIND: DatasetKind = DatasetKind::Products;

    fn decode(row: &Row) -> (Self, Vec<FieldFallback>) {
        let mut fields = FieldReader::new(row);
        let id = fields.optional_text(columns::ID);
        let name = fields.optional_text(columns::NAME);
        let category = fields.text(columns::CATEGORY);
        fields.finish(Self { id, name, category })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub segment: String,
}

impl RowRecord for Customer {
    const KIND: DatasetKind = DatasetKind::Customers;

    fn decode(row: &Row) -> (Self, Vec<FieldFallback>) {
        let mut fields = FieldReader::new(row);
        let id = fields.optional_text(columns::ID);
        let name = fields.optional_text(columns::NAME);
        let segment = fields.text(columns::SEGMENT);
        fields.finish(Self { id, name, segment })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateEntry {
    pub year: i64,
    pub month_name: String,
}

impl RowRecord for DateEntry {
    const KIND: DatasetKind = DatasetKind::Dates;

    fn decode(row: &Row) -> (Self, Vec<FieldFallback>) {
        let mut fields = FieldReader::new(row);
        let year = fields.integer(columns::YEAR);
        let month_name = fields.text(columns::MONTH_NAME);
        fields.finish(Self { year, month_name })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiscEntry {
    pub column1: String,
    pub column2: String,
}

impl RowRecord for MiscEntry {
    const KIND: DatasetKind = DatasetKind::Misc;

    fn decode(row: &Row) -> (Self, Vec<FieldFallback>) {
        let mut fields = FieldReader::new(row);
        let column1 = fields.text(columns::COLUMN1);
        let column2 = fields.text(columns::COLUMN2);
        fields.finish(Self { column1, column2 })
    }
}

/// Decode every row of one dataset. Never fails; fallbacks land in `ledger`.
pub fn decode_rows<R: RowRecord>(rows: &[Row], ledger: &mut CoercionLedger) -> Vec<R> {
    let mut out = Vec::with_capacity(rows.len());
    let before = ledger.len();
    for (pos, row) in rows.iter().enumerate() {
        let (record, fallbacks) = R::decode(row);
        for fallback in fallbacks {
            ledger.push(CoercionRecord::for_field(
                fallback.issue.into(),
                R::KIND.name(),
                pos,
                fallback.column,
            ));
        }
        out.push(record);
    }
    debug!(
        dataset = %R::KIND,
        rows = out.len(),
        fallbacks = ledger.len() - before,
        "decoded dataset"
    );
    out
}

#[cfg(test)]
mod tests {
    use sb_runtime::{CoercionLedger, IssueKind};
    use sb_types::{CoercionIssue, NullKind, Row, Scalar};

    use super::{
        Customer, DatasetKind, DateEntry, FieldFallback, MiscEntry, Product, RowRecord, Sale,
        decode_rows,
    };

    #[test]
    fn sale_decodes_well_formed_row() {
        let row = Row::new().with("City", "Lagos").with("Sales", 125.5);
        let (sale, fallbacks) = Sale::decode(&row);
        assert_eq!(sale.city, "Lagos");
        assert_eq!(sale.sales, 125.5);
        assert!(fallbacks.is_empty());
    }

    #[test]
    fn sale_with_text_measure_contributes_zero() {
        let row = Row::new().with("City", "Lagos").with("Sales", "n/a");
        let (sale, fallbacks) = Sale::decode(&row);
        assert_eq!(sale.sales, 0.0);
        assert_eq!(
            fallbacks,
            vec![FieldFallback {
                column: "Sales",
                issue: CoercionIssue::NonNumericValue,
            }]
        );
    }

    #[test]
    fn sale_numeric_text_measure_parses() {
        let row = Row::new().with("City", "Accra").with("Sales", " 40 ");
        assert_eq!(Sale::from_row(&row).sales, 40.0);
    }

    #[test]
    fn empty_row_degrades_every_field() {
        let row = Row::new();
        let (sale, fallbacks) = Sale::decode(&row);
        assert_eq!(sale.city, "");
        assert_eq!(sale.sales, 0.0);
        assert_eq!(fallbacks.len(), 2);
        assert!(
            fallbacks
                .iter()
                .all(|f| f.issue == CoercionIssue::MissingField)
        );
    }

    #[test]
    fn product_descriptive_fields_are_optional() {
        let row = Row::new()
            .with("ID", 17_i64)
            .with("Category", "Furniture")
            .with("Name", Scalar::Null(NullKind::Null));
        let (product, fallbacks) = Product::decode(&row);
        assert_eq!(product.id.as_deref(), Some("17"));
        assert_eq!(product.name, None);
        assert_eq!(product.category, "Furniture");
        assert!(fallbacks.is_empty());
    }

    #[test]
    fn customer_missing_segment_is_empty_string() {
        let row = Row::new().with("Name", "Ada");
        let (customer, fallbacks) = Customer::decode(&row);
        assert_eq!(customer.segment, "");
        assert_eq!(customer.name.as_deref(), Some("Ada"));
        assert_eq!(fallbacks.len(), 1);
        assert_eq!(fallbacks[0].column, "Segment");
    }

    #[test]
    fn date_entry_coerces_float_and_text_years() {
        let from_float = Row::new().with("Year", 2024.0).with("Month Name", "Jan");
        let from_text = Row::new().with("Year", "2023").with("Month Name", "Feb");
        assert_eq!(
            DateEntry::from_row(&from_float),
            DateEntry {
                year: 2024,
                month_name: "Jan".to_owned()
            }
        );
        assert_eq!(DateEntry::from_row(&from_text).year, 2023);
    }

    #[test]
    fn misc_entry_reads_both_columns() {
        let row = Row::new().with("Column1", "channel").with("Column2", 3_i64);
        let entry = MiscEntry::from_row(&row);
        assert_eq!(entry.column1, "channel");
        assert_eq!(entry.column2, "3");
    }

    #[test]
    fn decode_rows_records_fallbacks_with_positions() {
        let rows = vec![
            Row::new().with("City", "A").with("Sales", 10_i64),
            Row::new().with("City", "B"),
            Row::new().with("Sales", "ten"),
        ];
        let mut ledger = CoercionLedger::new();
        let sales = decode_rows::<Sale>(&rows, &mut ledger);

        assert_eq!(sales.len(), 3);
        let found = ledger
            .records()
            .iter()
            .map(|r| (r.kind, r.row, r.subject.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            found,
            vec![
                (IssueKind::MissingField, Some(1), "Sales"),
                (IssueKind::MissingField, Some(2), "City"),
                (IssueKind::NonNumericValue, Some(2), "Sales"),
            ]
        );
        assert!(ledger.records().iter().all(|r| r.dataset == "sales"));
    }

    #[test]
    fn decode_rows_of_empty_dataset_is_empty() {
        let mut ledger = CoercionLedger::new();
        let products = decode_rows::<Product>(&[], &mut ledger);
        assert!(products.is_empty());
        assert!(ledger.is_empty());
    }

    #[test]
    fn dataset_kinds_map_to_stock_sheets() {
        let sheets = DatasetKind::ALL
            .iter()
            .map(|kind| kind.default_sheet())
            .collect::<Vec<_>>();
        assert_eq!(sheets, vec!["Sheet1", "Sheet2", "Sheet3", "Sheet4", "Sheet5"]);
        assert_eq!(DatasetKind::Dates.to_string(), "dates");
    }
}
