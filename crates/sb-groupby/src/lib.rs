#![forbid(unsafe_code)]

use std::{collections::HashMap, fmt};

use sb_model::{Customer, DateEntry, MiscEntry, Product, Sale};
use serde::{Deserialize, Serialize};

/// Grouping key for one summary record.
///
/// Dates group on the `(year, month)` pair itself rather than on the joined
/// label, so the key never has to be split back apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Text(String),
    YearMonth { year: i64, month: String },
}

impl GroupKey {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    #[must_use]
    pub fn year_month(year: i64, month: impl Into<String>) -> Self {
        Self::YearMonth {
            year,
            month: month.into(),
        }
    }

    /// Display label; `YearMonth` renders as `"{year}-{month}"`.
    #[must_use]
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::YearMonth { year, month } => write!(f, "{year}-{month}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub key: GroupKey,
    pub metric: f64,
}

impl SummaryRecord {
    #[must_use]
    pub fn new(key: GroupKey, metric: f64) -> Self {
        Self { key, metric }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    /// Each row contributes `1`.
    Count,
    /// Each row contributes its measure.
    Sum,
}

/// Which misc column to group on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiscColumn {
    #[default]
    Column1,
    Column2,
}

/// Single-pass group-by.
///
/// Emits one record per distinct key in first-seen order. The metric of a
/// key is the sum of `value_of` over its rows, so the metrics of the output
/// always add up to the sum of `value_of` over the input.
pub fn aggregate<R, K, V>(rows: &[R], key_of: K, value_of: V) -> Vec<SummaryRecord>
where
    K: Fn(&R) -> GroupKey,
    V: Fn(&R) -> f64,
{
    // Store the output position per key so each distinct key is cloned once.
    let mut positions = HashMap::<GroupKey, usize>::new();
    let mut out = Vec::<SummaryRecord>::new();

    for row in rows {
        let key = key_of(row);
        let value = value_of(row);
        if let Some(&pos) = positions.get(&key) {
            out[pos].metric += value;
        } else {
            positions.insert(key.clone(), out.len());
            out.push(SummaryRecord::new(key, value));
        }
    }

    out
}

/// [`aggregate`] with the per-row contribution chosen by `func`.
pub fn aggregate_by<R, K, M>(
    rows: &[R],
    key_of: K,
    measure_of: M,
    func: AggFunc,
) -> Vec<SummaryRecord>
where
    K: Fn(&R) -> GroupKey,
    M: Fn(&R) -> f64,
{
    match func {
        AggFunc::Count => aggregate(rows, key_of, |_| 1.0),
        AggFunc::Sum => aggregate(rows, key_of, measure_of),
    }
}

fn count_by<R, K>(rows: &[R], key_of: K) -> Vec<SummaryRecord>
where
    K: Fn(&R) -> GroupKey,
{
    aggregate_by(rows, key_of, |_| 0.0, AggFunc::Count)
}

#[must_use]
pub fn sales_by_city(sales: &[Sale]) -> Vec<SummaryRecord> {
    aggregate_by(
        sales,
        |sale| GroupKey::text(sale.city.as_str()),
        |sale| sale.sales,
        AggFunc::Sum,
    )
}

#[must_use]
pub fn products_by_category(products: &[Product]) -> Vec<SummaryRecord> {
    count_by(products, |product| GroupKey::text(product.category.as_str()))
}

#[must_use]
pub fn customers_by_segment(customers: &[Customer]) -> Vec<SummaryRecord> {
    count_by(customers, |customer| {
        GroupKey::text(customer.segment.as_str())
    })
}

#[must_use]
pub fn dates_by_year_month(dates: &[DateEntry]) -> Vec<SummaryRecord> {
    count_by(dates, |date| {
        GroupKey::year_month(date.year, date.month_name.as_str())
    })
}

#[must_use]
pub fn misc_by_column(misc: &[MiscEntry], column: MiscColumn) -> Vec<SummaryRecord> {
    match column {
        MiscColumn::Column1 => count_by(misc, |entry| GroupKey::text(entry.column1.as_str())),
        MiscColumn::Column2 => count_by(misc, |entry| GroupKey::text(entry.column2.as_str())),
    }
}

/// Sum of all metrics, i.e. the raw-row total the summaries were built from.
#[must_use]
pub fn grand_total(summaries: &[SummaryRecord]) -> f64 {
    summaries.iter().map(|record| record.metric).sum()
}

#[cfg(test)]
mod tests {
    use sb_model::{Customer, DateEntry, MiscEntry, Product, Sale};

    use super::{
        AggFunc, GroupKey, MiscColumn, SummaryRecord, aggregate, aggregate_by,
        customers_by_segment, dates_by_year_month, grand_total, misc_by_column,
        products_by_category, sales_by_city,
    };

    fn sale(city: &str, sales: f64) -> Sale {
        Sale {
            city: city.to_owned(),
            sales,
        }
    }

    fn product(category: &str) -> Product {
        Product {
            id: None,
            name: None,
            category: category.to_owned(),
        }
    }

    fn date(year: i64, month: &str) -> DateEntry {
        DateEntry {
            year,
            month_name: month.to_owned(),
        }
    }

    fn metric_of(out: &[SummaryRecord], key: &GroupKey) -> Option<f64> {
        out.iter().find(|r| &r.key == key).map(|r| r.metric)
    }

    #[test]
    fn sales_sum_by_city() {
        let sales = vec![sale("A", 10.0), sale("B", 5.0), sale("A", 3.0)];
        let out = sales_by_city(&sales);

        assert_eq!(out.len(), 2);
        assert_eq!(metric_of(&out, &GroupKey::text("A")), Some(13.0));
        assert_eq!(metric_of(&out, &GroupKey::text("B")), Some(5.0));
    }

    #[test]
    fn aggregate_emits_first_seen_key_order() {
        let sales = vec![sale("b", 1.0), sale("a", 2.0), sale("b", 3.0), sale("a", 4.0)];
        let out = sales_by_city(&sales);
        assert_eq!(
            out,
            vec![
                SummaryRecord::new(GroupKey::text("b"), 4.0),
                SummaryRecord::new(GroupKey::text("a"), 6.0),
            ]
        );
    }

    #[test]
    fn products_count_by_category() {
        let products = vec![product("X"), product("X"), product("Y")];
        let out = products_by_category(&products);
        assert_eq!(metric_of(&out, &GroupKey::text("X")), Some(2.0));
        assert_eq!(metric_of(&out, &GroupKey::text("Y")), Some(1.0));
    }

    #[test]
    fn customers_count_by_segment_including_blank() {
        let customers = ["Consumer", "", "Consumer", "Corporate"]
            .into_iter()
            .map(|segment| Customer {
                id: None,
                name: None,
                segment: segment.to_owned(),
            })
            .collect::<Vec<_>>();
        let out = customers_by_segment(&customers);
        assert_eq!(metric_of(&out, &GroupKey::text("Consumer")), Some(2.0));
        assert_eq!(metric_of(&out, &GroupKey::text("")), Some(1.0));
        assert_eq!(grand_total(&out), 4.0);
    }

    #[test]
    fn dates_count_by_year_and_month() {
        let dates = vec![date(2024, "Jan"), date(2024, "Jan"), date(2023, "Feb")];
        let out = dates_by_year_month(&dates);

        let labels = out
            .iter()
            .map(|r| (r.key.label(), r.metric))
            .collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec![("2024-Jan".to_owned(), 2.0), ("2023-Feb".to_owned(), 1.0)]
        );
    }

    #[test]
    fn date_keys_keep_months_containing_the_separator_intact() {
        let dates = vec![date(2024, "Mid-Jan"), date(2024, "Mid"), date(2024, "Mid-Jan")];
        let out = dates_by_year_month(&dates);
        assert_eq!(out.len(), 2);
        assert_eq!(
            metric_of(&out, &GroupKey::year_month(2024, "Mid-Jan")),
            Some(2.0)
        );
        assert_eq!(metric_of(&out, &GroupKey::year_month(2024, "Mid")), Some(1.0));
        assert_eq!(out[0].key.label(), "2024-Mid-Jan");
    }

    #[test]
    fn misc_groups_on_selected_column() {
        let misc = vec![
            MiscEntry {
                column1: "web".to_owned(),
                column2: "promo".to_owned(),
            },
            MiscEntry {
                column1: "web".to_owned(),
                column2: "organic".to_owned(),
            },
        ];
        let by_first = misc_by_column(&misc, MiscColumn::Column1);
        assert_eq!(by_first, vec![SummaryRecord::new(GroupKey::text("web"), 2.0)]);

        let by_second = misc_by_column(&misc, MiscColumn::Column2);
        assert_eq!(by_second.len(), 2);
        assert_eq!(MiscColumn::default(), MiscColumn::Column1);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(sales_by_city(&[]).is_empty());
        assert!(dates_by_year_month(&[]).is_empty());
        assert_eq!(grand_total(&[]), 0.0);
    }

    #[test]
    fn grand_total_matches_raw_sum() {
        let sales = vec![
            sale("A", 1.5),
            sale("B", 2.25),
            sale("A", -0.75),
            sale("C", 0.0),
            sale("B", 10.0),
        ];
        let raw: f64 = sales.iter().map(|s| s.sales).sum();
        assert!((grand_total(&sales_by_city(&sales)) - raw).abs() < 1e-9);
    }

    #[test]
    fn aggregate_by_count_ignores_measure() {
        let sales = vec![sale("A", 100.0), sale("A", 200.0)];
        let out = aggregate_by(
            &sales,
            |s| GroupKey::text(s.city.as_str()),
            |s| s.sales,
            AggFunc::Count,
        );
        assert_eq!(out, vec![SummaryRecord::new(GroupKey::text("A"), 2.0)]);
    }

    #[test]
    fn aggregate_accepts_arbitrary_key_functions() {
        let values = [1_i64, 2, 3, 4, 5, 6];
        let out = aggregate(
            &values,
            |v| GroupKey::text(if v % 2 == 0 { "even" } else { "odd" }),
            |v| *v as f64,
        );
        assert_eq!(metric_of(&out, &GroupKey::text("odd")), Some(9.0));
        assert_eq!(metric_of(&out, &GroupKey::text("even")), Some(12.0));
    }

    #[test]
    fn group_key_display_forms() {
        assert_eq!(GroupKey::text("Lagos").to_string(), "Lagos");
        assert_eq!(GroupKey::year_month(2023, "Feb").label(), "2023-Feb");
    }
}
