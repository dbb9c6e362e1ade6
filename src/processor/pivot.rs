use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::debug;

use crate::processor::{AnalyticsError, GroupKey, aggregator::AggregateRow};

/// Fractional digits kept in pivoted output
pub const OUTPUT_SCALE: u32 = 2;

/// Rounds half away from zero to [`OUTPUT_SCALE`] digits
pub fn round_output(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(OUTPUT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearValue {
    pub year: i32,
    pub value: Decimal,
}

/// One period with a column per requested year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotRow {
    pub period: GroupKey,
    /// One entry per requested year, in request order
    pub columns: Vec<YearValue>,
}

impl PivotRow {
    pub fn value(&self, year: i32) -> Option<Decimal> {
        self.columns
            .iter()
            .find(|c| c.year == year)
            .map(|c| c.value)
    }
}

/// Reshapes `(period, year)` aggregates into one row per period.
///
/// Every period present in the input gets a row, whatever its years; a
/// requested year with no aggregate for that period contributes zero.
/// Values are summed exactly and rounded once when the row is emitted.
#[derive(Debug, Clone)]
pub struct PeriodPivot {
    period_by: Vec<usize>,
    year_at: usize,
    measure: usize,
    years: Vec<i32>,
}

impl PeriodPivot {
    pub fn new(period_by: Vec<usize>, year_at: usize, measure: usize, years: Vec<i32>) -> Self {
        Self {
            period_by,
            year_at,
            measure,
            years,
        }
    }

    /// Output is ordered by period ascending
    pub fn pivot(&self, rows: &[AggregateRow]) -> Result<Vec<PivotRow>, AnalyticsError> {
        self.check_years()?;

        let mut periods: BTreeMap<GroupKey, Vec<Decimal>> = BTreeMap::new();
        for row in rows {
            let period = row.key.project(&self.period_by)?;
            let year = row.key.int(self.year_at)?;
            let value = row.measure(self.measure)?;

            let sums = periods
                .entry(period)
                .or_insert_with(|| vec![Decimal::ZERO; self.years.len()]);

            if let Some(pos) = self.years.iter().position(|&y| i64::from(y) == year) {
                sums[pos] = sums[pos].checked_add(value).ok_or_else(|| {
                    AnalyticsError::ArithmeticOverflow(format!("pivot column {year}"))
                })?;
            }
        }

        debug!(periods = periods.len(), years = ?self.years, "pivot finished");

        Ok(periods
            .into_iter()
            .map(|(period, sums)| PivotRow {
                period,
                columns: self
                    .years
                    .iter()
                    .zip(sums)
                    .map(|(&year, sum)| YearValue {
                        year,
                        value: round_output(sum),
                    })
                    .collect(),
            })
            .collect())
    }

    fn check_years(&self) -> Result<(), AnalyticsError> {
        if self.years.is_empty() {
            return Err(AnalyticsError::InvalidQuery(
                "pivot needs at least one year".into(),
            ));
        }
        for (i, year) in self.years.iter().enumerate() {
            if self.years[..i].contains(year) {
                return Err(AnalyticsError::InvalidQuery(format!(
                    "year {year} requested twice"
                )));
            }
        }
        Ok(())
    }
}
