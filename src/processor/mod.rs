use std::fmt;
use std::sync::Arc;

use chrono::Datelike;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::processor::order_line::OrderLine;

pub mod aggregator;
pub mod fact_table;
pub mod growth;
pub mod order_line;
pub mod pivot;
pub mod query_builder;
pub mod ranker;
pub mod reports;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input at row {row}, column '{column}': {reason}")]
    InvalidInput {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("arithmetic overflow while summing {0}")]
    ArithmeticOverflow(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AnalyticsError {
    pub(crate) fn invalid_input(
        row: usize,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AnalyticsError::InvalidInput {
            row,
            column: column.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of a successful snapshot load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub chunks: usize,
}

/// One component of a grouping key.
///
/// Text and integer components never mix within one key position, so the
/// derived ordering (variant first, then value) is the natural order of
/// each column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(Arc<str>),
}

impl KeyValue {
    pub fn as_text(&self) -> Option<&Arc<str>> {
        match self {
            KeyValue::Text(s) => Some(s),
            KeyValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyValue::Int(v) => Some(*v),
            KeyValue::Text(_) => None,
        }
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Text(Arc::from(value))
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{v}"),
            KeyValue::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered tuple of key components identifying a group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupKey(Vec<KeyValue>);

impl GroupKey {
    pub fn new(values: Vec<KeyValue>) -> Self {
        GroupKey(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&KeyValue> {
        self.0.get(idx)
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }

    /// Builds a narrower key from the given positions, in the order given.
    ///
    /// Callers validate positions up front; an out-of-range position is a
    /// planning bug and is reported as [`AnalyticsError::InvalidQuery`].
    pub fn project(&self, positions: &[usize]) -> Result<GroupKey, AnalyticsError> {
        positions
            .iter()
            .map(|&p| {
                self.0.get(p).cloned().ok_or_else(|| {
                    AnalyticsError::InvalidQuery(format!(
                        "key position {p} out of range for key of width {}",
                        self.0.len()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(GroupKey)
    }

    pub fn text(&self, idx: usize) -> Result<Arc<str>, AnalyticsError> {
        self.get(idx)
            .and_then(KeyValue::as_text)
            .cloned()
            .ok_or_else(|| AnalyticsError::InvalidQuery(format!("key position {idx} is not text")))
    }

    pub fn int(&self, idx: usize) -> Result<i64, AnalyticsError> {
        self.get(idx)
            .and_then(KeyValue::as_int)
            .ok_or_else(|| {
                AnalyticsError::InvalidQuery(format!("key position {idx} is not an integer"))
            })
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str(")")
    }
}

/// Grouping attributes of an [`OrderLine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Region,
    Country,
    City,
    State,
    PostalCode,
    Category,
    SubCategory,
    ProductId,
    ShipMode,
    Segment,
    /// Calendar year of the order date
    Year,
    /// Month number (1-12) of the order date
    Month,
    /// Year and month of the order date encoded as `YYYYMM`
    YearMonth,
}

impl Dimension {
    pub fn extract(self, row: &OrderLine) -> KeyValue {
        match self {
            Dimension::Region => KeyValue::Text(row.region.clone()),
            Dimension::Country => KeyValue::Text(row.country.clone()),
            Dimension::City => KeyValue::Text(row.city.clone()),
            Dimension::State => KeyValue::Text(row.state.clone()),
            Dimension::PostalCode => KeyValue::Text(row.postal_code.clone()),
            Dimension::Category => KeyValue::Text(row.category.clone()),
            Dimension::SubCategory => KeyValue::Text(row.sub_category.clone()),
            Dimension::ProductId => KeyValue::Text(row.product_id.clone()),
            Dimension::ShipMode => KeyValue::Text(row.ship_mode.clone()),
            Dimension::Segment => KeyValue::Text(row.segment.clone()),
            Dimension::Year => KeyValue::Int(i64::from(row.order_date.year())),
            Dimension::Month => KeyValue::Int(i64::from(row.order_date.month())),
            Dimension::YearMonth => KeyValue::Int(
                i64::from(row.order_date.year()) * 100 + i64::from(row.order_date.month()),
            ),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::Country => "country",
            Dimension::City => "city",
            Dimension::State => "state",
            Dimension::PostalCode => "postal_code",
            Dimension::Category => "category",
            Dimension::SubCategory => "sub_category",
            Dimension::ProductId => "product_id",
            Dimension::ShipMode => "ship_mode",
            Dimension::Segment => "segment",
            Dimension::Year => "order_year",
            Dimension::Month => "order_month",
            Dimension::YearMonth => "order_year_month",
        }
    }
}

/// Summable attributes of an [`OrderLine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    SalePrice,
    Profit,
    Discount,
    Quantity,
}

impl Measure {
    pub fn value(self, row: &OrderLine) -> Decimal {
        match self {
            Measure::SalePrice => row.sale_price,
            Measure::Profit => row.profit,
            Measure::Discount => row.discount,
            Measure::Quantity => Decimal::from(row.quantity),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Measure::SalePrice => "sale_price",
            Measure::Profit => "profit",
            Measure::Discount => "discount",
            Measure::Quantity => "quantity",
        }
    }
}

/// Row filter applied to a dimension value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterPredicate {
    Equals(KeyValue),
    /// Inclusive on both ends
    Between(KeyValue, KeyValue),
    In(Vec<KeyValue>),
}

impl FilterPredicate {
    pub fn matches(&self, value: &KeyValue) -> bool {
        match self {
            FilterPredicate::Equals(target) => value == target,
            FilterPredicate::Between(low, high) => value >= low && value <= high,
            FilterPredicate::In(targets) => targets.contains(value),
        }
    }
}
