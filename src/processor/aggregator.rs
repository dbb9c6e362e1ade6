use std::collections::HashMap;

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::processor::{
    AnalyticsError, Dimension, FilterPredicate, GroupKey, Measure, order_line::OrderLine,
};

/// Rows handed to one rayon task by [`Aggregator::aggregate_par`]
const PARALLEL_CHUNK_ROWS: usize = 16 * 1024;

/// One output group: key plus the exact sum of every declared measure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    /// Sums in the order the measures were declared
    pub measures: Vec<Decimal>,
    /// Number of fact rows folded into this group
    pub row_count: u64,
}

impl AggregateRow {
    pub fn measure(&self, idx: usize) -> Result<Decimal, AnalyticsError> {
        self.measures.get(idx).copied().ok_or_else(|| {
            AnalyticsError::InvalidQuery(format!(
                "measure position {idx} out of range ({} measures)",
                self.measures.len()
            ))
        })
    }
}

/// Group-by plan: which dimensions form the key, which measures get summed,
/// and which rows take part at all.
#[derive(Debug, Clone)]
pub struct Aggregator {
    dimensions: Vec<Dimension>,
    measures: Vec<Measure>,
    filters: Vec<(Dimension, FilterPredicate)>,
}

impl Aggregator {
    pub fn new(dimensions: Vec<Dimension>, measures: Vec<Measure>) -> Self {
        Self {
            dimensions,
            measures,
            filters: Vec::new(),
        }
    }

    /// Only rows whose `dimension` satisfies `predicate` are aggregated
    pub fn with_filter(mut self, dimension: Dimension, predicate: FilterPredicate) -> Self {
        self.filters.push((dimension, predicate));
        self
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    /// Empty streaming state for this plan
    pub fn start(&self) -> HashAggregation<'_> {
        HashAggregation {
            plan: self,
            groups: HashMap::new(),
        }
    }

    /// Single pass over `rows`, returning groups in ascending key order
    pub fn aggregate<'a, I>(&self, rows: I) -> Result<Vec<AggregateRow>, AnalyticsError>
    where
        I: IntoIterator<Item = &'a OrderLine>,
    {
        let mut state = self.start();
        for row in rows {
            state.update(row)?;
        }
        Ok(state.finish())
    }

    /// Same result as [`Aggregator::aggregate`], folding chunks of the slice
    /// on the rayon pool and merging the partial states.
    pub fn aggregate_par(&self, rows: &[OrderLine]) -> Result<Vec<AggregateRow>, AnalyticsError> {
        let state = rows
            .par_chunks(PARALLEL_CHUNK_ROWS)
            .map(|chunk| {
                let mut partial = self.start();
                for row in chunk {
                    partial.update(row)?;
                }
                Ok::<_, AnalyticsError>(partial)
            })
            .try_reduce(
                || self.start(),
                |mut acc, partial| {
                    acc.merge(partial)?;
                    Ok(acc)
                },
            )?;
        Ok(state.finish())
    }

    fn accepts(&self, row: &OrderLine) -> bool {
        self.filters
            .iter()
            .all(|(dimension, predicate)| predicate.matches(&dimension.extract(row)))
    }

    fn key_of(&self, row: &OrderLine) -> GroupKey {
        GroupKey::new(self.dimensions.iter().map(|d| d.extract(row)).collect())
    }
}

#[derive(Debug, Clone)]
struct Accumulator {
    sums: Vec<Decimal>,
    rows: u64,
}

/// Partial sums keyed by group, flushed by [`HashAggregation::finish`].
///
/// Memory grows with the number of distinct groups, not with the number of
/// rows pushed through [`HashAggregation::update`].
#[derive(Debug)]
pub struct HashAggregation<'p> {
    plan: &'p Aggregator,
    groups: HashMap<GroupKey, Accumulator>,
}

impl HashAggregation<'_> {
    pub fn update(&mut self, row: &OrderLine) -> Result<(), AnalyticsError> {
        if !self.plan.accepts(row) {
            return Ok(());
        }

        let plan = self.plan;
        let measures = &plan.measures;
        let acc = self
            .groups
            .entry(plan.key_of(row))
            .or_insert_with(|| Accumulator {
                sums: vec![Decimal::ZERO; measures.len()],
                rows: 0,
            });

        for (sum, measure) in acc.sums.iter_mut().zip(measures) {
            *sum = sum
                .checked_add(measure.value(row))
                .ok_or_else(|| AnalyticsError::ArithmeticOverflow(measure.name().to_string()))?;
        }
        acc.rows += 1;
        Ok(())
    }

    /// Folds another partial state of the same plan into this one
    pub fn merge(&mut self, other: HashAggregation<'_>) -> Result<(), AnalyticsError> {
        for (key, theirs) in other.groups {
            match self.groups.get_mut(&key) {
                Some(ours) => {
                    for ((sum, add), measure) in
                        ours.sums.iter_mut().zip(theirs.sums).zip(&self.plan.measures)
                    {
                        *sum = sum.checked_add(add).ok_or_else(|| {
                            AnalyticsError::ArithmeticOverflow(measure.name().to_string())
                        })?;
                    }
                    ours.rows += theirs.rows;
                }
                None => {
                    self.groups.insert(key, theirs);
                }
            }
        }
        Ok(())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn finish(self) -> Vec<AggregateRow> {
        let mut out: Vec<AggregateRow> = self
            .groups
            .into_iter()
            .map(|(key, acc)| AggregateRow {
                key,
                measures: acc.sums,
                row_count: acc.rows,
            })
            .collect();
        out.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        debug!(
            groups = out.len(),
            dimensions = ?self.plan.dimensions,
            "hash aggregation finished"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::order_line::test_rows::line;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sample() -> Vec<OrderLine> {
        vec![
            line("2022-01-10", "West", "Furniture", "Chairs", "P-1", "10.10", "1.00"),
            line("2022-02-10", "West", "Furniture", "Chairs", "P-1", "20.20", "-3.00"),
            line("2023-01-10", "East", "Technology", "Phones", "P-1", "5.05", "2.50"),
            line("2023-03-10", "East", "Furniture", "Tables", "P-2", "0.01", "0.01"),
        ]
    }

    #[test]
    fn test_composite_key_separates_same_product_id() {
        let rows = sample();
        let agg = Aggregator::new(
            vec![Dimension::ProductId, Dimension::Category],
            vec![Measure::Profit, Measure::SalePrice],
        );
        let out = agg.aggregate(&rows).unwrap();

        assert_eq!(out.len(), 3);
        assert_eq!(
            out[0].key,
            GroupKey::new(vec!["P-1".into(), "Furniture".into()])
        );
        assert_eq!(out[0].measures, vec![d("-2.00"), d("30.30")]);
        assert_eq!(out[0].row_count, 2);
        assert_eq!(
            out[1].key,
            GroupKey::new(vec!["P-1".into(), "Technology".into()])
        );
    }

    #[test]
    fn test_grouping_completeness() {
        let rows = sample();
        let agg = Aggregator::new(vec![Dimension::Region], vec![Measure::SalePrice]);
        let out = agg.aggregate(&rows).unwrap();

        let total_rows: u64 = out.iter().map(|r| r.row_count).sum();
        assert_eq!(total_rows, rows.len() as u64);
        let total: Decimal = out.iter().map(|r| r.measures[0]).sum();
        assert_eq!(total, d("35.36"));
    }

    #[test]
    fn test_input_order_does_not_change_output() {
        let rows = sample();
        let mut reversed = rows.clone();
        reversed.reverse();
        let agg = Aggregator::new(
            vec![Dimension::Year, Dimension::Month],
            vec![Measure::SalePrice],
        );
        assert_eq!(agg.aggregate(&rows).unwrap(), agg.aggregate(&reversed).unwrap());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let base = sample();
        let rows: Vec<OrderLine> = base.iter().cycle().take(50_000).cloned().collect();
        let agg = Aggregator::new(
            vec![Dimension::Region, Dimension::ProductId],
            vec![Measure::SalePrice, Measure::Profit, Measure::Quantity],
        );
        assert_eq!(agg.aggregate(&rows).unwrap(), agg.aggregate_par(&rows).unwrap());
    }

    #[test]
    fn test_filtered_rows_are_not_emitted() {
        let rows = sample();
        let agg = Aggregator::new(vec![Dimension::Region], vec![Measure::SalePrice])
            .with_filter(Dimension::Year, FilterPredicate::Equals(2022.into()));
        let out = agg.aggregate(&rows).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].key, GroupKey::new(vec!["West".into()]));
    }

    #[test]
    fn test_empty_input_emits_no_groups() {
        let agg = Aggregator::new(vec![Dimension::Category], vec![Measure::Profit]);
        let empty: Vec<OrderLine> = Vec::new();
        assert!(agg.aggregate(&empty).unwrap().is_empty());
        assert!(agg.aggregate_par(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut a = line("2022-01-10", "West", "Furniture", "Chairs", "P-1", "0", "0");
        a.sale_price = Decimal::MAX;
        let b = a.clone();
        let agg = Aggregator::new(vec![Dimension::Region], vec![Measure::SalePrice]);
        match agg.aggregate([&a, &b]) {
            Err(AnalyticsError::ArithmeticOverflow(what)) => assert_eq!(what, "sale_price"),
            other => panic!("Expected overflow, got {:?}", other),
        }
    }
}
