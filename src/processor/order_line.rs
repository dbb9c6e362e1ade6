use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::processor::AnalyticsError;

/// Largest number of fractional digits accepted for money fields
pub const MONEY_SCALE: u32 = 2;

/// One product line within an order.
///
/// Rows are produced once by the loader and only read afterwards; text
/// dimensions are shared so that grouping keys can be built by bumping a
/// reference count instead of copying.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderLine {
    pub order_id: u64,
    pub order_date: NaiveDate,
    pub ship_mode: Arc<str>,
    pub segment: Arc<str>,
    pub country: Arc<str>,
    pub city: Arc<str>,
    pub state: Arc<str>,
    pub postal_code: Arc<str>,
    pub region: Arc<str>,
    pub category: Arc<str>,
    pub sub_category: Arc<str>,
    pub product_id: Arc<str>,
    pub quantity: u32,
    pub discount: Decimal,
    pub sale_price: Decimal,
    pub profit: Decimal,
}

impl OrderLine {
    /// Checks the row invariants the query stages rely on.
    ///
    /// `row` is only used to label the error.
    pub fn validate(&self, row: usize) -> Result<(), AnalyticsError> {
        let required = [
            ("region", &self.region),
            ("category", &self.category),
            ("sub_category", &self.sub_category),
            ("product_id", &self.product_id),
        ];
        for (column, value) in required {
            if value.trim().is_empty() {
                return Err(AnalyticsError::invalid_input(
                    row,
                    column,
                    "required dimension is empty",
                ));
            }
        }

        let amounts = [
            ("discount", self.discount),
            ("sale_price", self.sale_price),
            ("profit", self.profit),
        ];
        for (column, value) in amounts {
            if value.scale() > MONEY_SCALE {
                return Err(AnalyticsError::invalid_input(
                    row,
                    column,
                    format!("{value} has more than {MONEY_SCALE} decimal places"),
                ));
            }
        }

        Ok(())
    }
}
