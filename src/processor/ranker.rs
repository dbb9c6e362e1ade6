use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::processor::{AnalyticsError, GroupKey, aggregator::AggregateRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Which ranks survive ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankLimit {
    /// `rank <= k`
    TopK(usize),
    /// `rank == 1`
    First,
}

impl RankLimit {
    fn max_rank(self) -> usize {
        match self {
            RankLimit::TopK(k) => k,
            RankLimit::First => 1,
        }
    }
}

/// An aggregate row together with its partition and 1-based rank in it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRow {
    pub partition: GroupKey,
    pub rank: usize,
    #[serde(flatten)]
    pub row: AggregateRow,
}

/// Partition-then-sort ranking over aggregate rows.
///
/// Rows are bucketed by the key components at `partition_by` in one pass,
/// then each bucket is ordered by the measure at `order_by`. Equal measures
/// fall back to the full group key in ascending order, so ranks are row
/// numbers over a total order and never repeat within a partition.
#[derive(Debug, Clone)]
pub struct Ranker {
    partition_by: Vec<usize>,
    order_by: usize,
    order: SortOrder,
    limit: RankLimit,
}

impl Ranker {
    /// Ranks all rows as a single partition
    pub fn new(order_by: usize, order: SortOrder, limit: RankLimit) -> Self {
        Self {
            partition_by: Vec::new(),
            order_by,
            order,
            limit,
        }
    }

    /// Key positions forming the partition
    pub fn partition_by(mut self, positions: Vec<usize>) -> Self {
        self.partition_by = positions;
        self
    }

    /// Output is sorted by partition, then by rank
    pub fn rank(&self, rows: Vec<AggregateRow>) -> Result<Vec<RankedRow>, AnalyticsError> {
        let mut buckets: BTreeMap<GroupKey, Vec<AggregateRow>> = BTreeMap::new();
        for row in rows {
            row.measure(self.order_by)?;
            let partition = row.key.project(&self.partition_by)?;
            buckets.entry(partition).or_default().push(row);
        }

        let partitions = buckets.len();
        let keep = self.limit.max_rank();
        let mut out = Vec::with_capacity(partitions.saturating_mul(keep.min(16)));

        for (partition, mut bucket) in buckets {
            if keep == 0 {
                break;
            }
            if keep < bucket.len() {
                bucket.select_nth_unstable_by(keep - 1, |a, b| self.compare(a, b));
                bucket.truncate(keep);
            }
            bucket.sort_unstable_by(|a, b| self.compare(a, b));

            out.extend(bucket.into_iter().enumerate().map(|(i, row)| RankedRow {
                partition: partition.clone(),
                rank: i + 1,
                row,
            }));
        }

        debug!(partitions, kept = out.len(), "ranking finished");
        Ok(out)
    }

    // measure positions were checked in `rank`
    fn compare(&self, a: &AggregateRow, b: &AggregateRow) -> Ordering {
        let (x, y) = (a.measures[self.order_by], b.measures[self.order_by]);
        let by_measure = match self.order {
            SortOrder::Ascending => x.cmp(&y),
            SortOrder::Descending => y.cmp(&x),
        };
        by_measure.then_with(|| a.key.cmp(&b.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::KeyValue;
    use rust_decimal::Decimal;

    fn agg(region: &str, product: &str, sales: &str) -> AggregateRow {
        AggregateRow {
            key: GroupKey::new(vec![KeyValue::from(region), KeyValue::from(product)]),
            measures: vec![sales.parse::<Decimal>().unwrap()],
            row_count: 1,
        }
    }

    fn rows() -> Vec<AggregateRow> {
        vec![
            agg("West", "P-1", "10.00"),
            agg("East", "P-9", "3.00"),
            agg("West", "P-2", "40.00"),
            agg("East", "P-7", "8.00"),
            agg("West", "P-3", "25.00"),
            agg("East", "P-8", "8.00"),
            agg("West", "P-4", "5.00"),
        ]
    }

    fn products(ranked: &[RankedRow]) -> Vec<(String, usize)> {
        ranked
            .iter()
            .map(|r| (r.row.key.get(1).unwrap().to_string(), r.rank))
            .collect()
    }

    #[test]
    fn test_top_k_per_partition() {
        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::TopK(2)).partition_by(vec![0]);
        let ranked = ranker.rank(rows()).unwrap();

        assert_eq!(
            products(&ranked),
            vec![
                ("P-7".to_string(), 1),
                ("P-8".to_string(), 2),
                ("P-2".to_string(), 1),
                ("P-3".to_string(), 2),
            ]
        );
        assert_eq!(ranked[0].partition, GroupKey::new(vec!["East".into()]));
    }

    #[test]
    fn test_ties_fall_back_to_key_order() {
        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::First).partition_by(vec![0]);
        let ranked = ranker.rank(rows()).unwrap();
        // P-7 and P-8 both sold 8.00 in East
        assert_eq!(ranked[0].row.key.get(1), Some(&KeyValue::from("P-7")));
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_fewer_rows_than_k_are_not_padded() {
        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::TopK(5)).partition_by(vec![0]);
        let ranked = ranker.rank(rows()).unwrap();
        let east: Vec<_> = ranked
            .iter()
            .filter(|r| r.partition == GroupKey::new(vec!["East".into()]))
            .map(|r| r.rank)
            .collect();
        assert_eq!(east, vec![1, 2, 3]);
    }

    #[test]
    fn test_rank_monotonicity() {
        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::TopK(10)).partition_by(vec![0]);
        let ranked = ranker.rank(rows()).unwrap();
        for pair in ranked.windows(2) {
            if pair[0].partition == pair[1].partition {
                assert!(pair[0].row.measures[0] >= pair[1].row.measures[0]);
                assert_eq!(pair[0].rank + 1, pair[1].rank);
            }
        }
    }

    #[test]
    fn test_ascending_global_ranking() {
        let ranker = Ranker::new(0, SortOrder::Ascending, RankLimit::TopK(3));
        let ranked = ranker.rank(rows()).unwrap();
        assert_eq!(
            products(&ranked),
            vec![
                ("P-9".to_string(), 1),
                ("P-4".to_string(), 2),
                ("P-7".to_string(), 3),
            ]
        );
        assert!(ranked.iter().all(|r| r.partition.is_empty()));
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::TopK(0));
        assert!(ranker.rank(rows()).unwrap().is_empty());
    }

    #[test]
    fn test_bad_positions_are_rejected() {
        let ranker = Ranker::new(3, SortOrder::Descending, RankLimit::First);
        assert!(matches!(
            ranker.rank(rows()),
            Err(AnalyticsError::InvalidQuery(_))
        ));

        let ranker = Ranker::new(0, SortOrder::Descending, RankLimit::First).partition_by(vec![5]);
        assert!(matches!(
            ranker.rank(rows()),
            Err(AnalyticsError::InvalidQuery(_))
        ));
    }
}
