use rust_decimal::Decimal;
use serde::Serialize;

use crate::processor::{AnalyticsError, GroupKey, pivot::PivotRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRow {
    pub period: GroupKey,
    pub value_a: Decimal,
    pub value_b: Decimal,
    /// `value_b - value_a`, negative for a decline
    pub growth: Decimal,
}

/// Year-over-year delta between two pivot columns
#[derive(Debug, Clone, Copy)]
pub struct GrowthCalculator {
    year_a: i32,
    year_b: i32,
}

impl GrowthCalculator {
    pub fn new(year_a: i32, year_b: i32) -> Self {
        Self { year_a, year_b }
    }

    /// All rows, largest growth first; equal growth keeps period order
    pub fn ranked(&self, rows: &[PivotRow]) -> Result<Vec<GrowthRow>, AnalyticsError> {
        let mut out = rows
            .iter()
            .map(|row| self.growth_of(row))
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by(|a, b| b.growth.cmp(&a.growth).then_with(|| a.period.cmp(&b.period)));
        Ok(out)
    }

    /// The single row with the largest growth
    pub fn max(&self, rows: &[PivotRow]) -> Result<GrowthRow, AnalyticsError> {
        self.ranked(rows)?.into_iter().next().ok_or_else(|| {
            AnalyticsError::EmptyResult(format!(
                "no rows to compare {} against {}",
                self.year_b, self.year_a
            ))
        })
    }

    fn growth_of(&self, row: &PivotRow) -> Result<GrowthRow, AnalyticsError> {
        let column = |year: i32| {
            row.value(year).ok_or_else(|| {
                AnalyticsError::InvalidQuery(format!(
                    "pivot row {} has no column for {year}",
                    row.period
                ))
            })
        };
        let value_a = column(self.year_a)?;
        let value_b = column(self.year_b)?;
        let growth = value_b
            .checked_sub(value_a)
            .ok_or_else(|| AnalyticsError::ArithmeticOverflow("growth".into()))?;

        Ok(GrowthRow {
            period: row.period.clone(),
            value_a,
            value_b,
            growth,
        })
    }
}
