use lru::LruCache;

use crate::processor::aggregator::{AggregateRow, Aggregator};
use crate::processor::fact_table::FactTable;
use crate::processor::ranker::{RankLimit, RankedRow, Ranker, SortOrder};
use crate::processor::reports::ReportOutput;
use crate::processor::{AnalyticsError, Dimension, FilterPredicate, Measure};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Tables at least this large are aggregated on the rayon pool
const PARALLEL_THRESHOLD_ROWS: usize = 64 * 1024;

/// Report identity including every parameter that changes its output
#[derive(Debug, Hash, Eq, PartialEq, Clone)]
pub enum QueryKey {
    TopProducts { limit: usize },
    RegionTopSellers { per_region: usize },
    MonthlyGrowth { years: Vec<i32> },
    CategoryPeaks,
    SubCategoryGrowth { year_a: i32, year_b: i32 },
}

/// LRU of finished reports for one snapshot.
///
/// Reports are pure functions of the snapshot, so a hit is always equal to a
/// fresh run.
#[derive(Debug)]
pub struct QueryCache {
    cache: Mutex<LruCache<QueryKey, ReportOutput>>,
}

impl QueryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &QueryKey) -> Option<ReportOutput> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn put(&self, key: QueryKey, value: ReportOutput) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of [`QueryBuilder::execute`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// One row per group, ascending key order
    Grouped(Vec<AggregateRow>),
    /// Rows kept by the ranking, by partition then rank
    Ranked(Vec<RankedRow>),
}

impl QueryResult {
    pub fn into_grouped(self) -> Result<Vec<AggregateRow>, AnalyticsError> {
        match self {
            QueryResult::Grouped(rows) => Ok(rows),
            QueryResult::Ranked(_) => Err(AnalyticsError::InvalidQuery(
                "expected grouped rows, query was ranked".into(),
            )),
        }
    }

    pub fn into_ranked(self) -> Result<Vec<RankedRow>, AnalyticsError> {
        match self {
            QueryResult::Ranked(rows) => Ok(rows),
            QueryResult::Grouped(_) => Err(AnalyticsError::InvalidQuery(
                "expected ranked rows, query has no ranking".into(),
            )),
        }
    }
}

/// Fluent filter → aggregate → rank pipeline over a [`FactTable`]
///
/// ```rust
/// # use retail_analytics::{FactTable, Dimension, Measure, RankLimit, SortOrder};
/// let table = FactTable::new();
/// let top = table
///     .query()
///     .group_by(&[Dimension::Region, Dimension::ProductId])
///     .sum(Measure::SalePrice)
///     .rank_by(Measure::SalePrice, SortOrder::Descending)
///     .partition_by(&[Dimension::Region])
///     .limit(RankLimit::TopK(5))
///     .execute()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder<'t> {
    table: &'t FactTable,
    filters: Vec<(Dimension, FilterPredicate)>,
    group_by: Vec<Dimension>,
    measures: Vec<Measure>,
    rank_by: Option<(Measure, SortOrder)>,
    partition_by: Vec<Dimension>,
    limit: Option<RankLimit>,
    parallel: Option<bool>,
}

impl<'t> QueryBuilder<'t> {
    pub fn new(table: &'t FactTable) -> Self {
        Self {
            table,
            filters: Vec::new(),
            group_by: Vec::new(),
            measures: Vec::new(),
            rank_by: None,
            partition_by: Vec::new(),
            limit: None,
            parallel: None,
        }
    }

    /// Add a filter condition
    pub fn filter(mut self, dimension: Dimension, predicate: FilterPredicate) -> Self {
        self.filters.push((dimension, predicate));
        self
    }

    /// Append grouping dimensions, in key order
    pub fn group_by(mut self, dimensions: &[Dimension]) -> Self {
        self.group_by.extend_from_slice(dimensions);
        self
    }

    /// Add a summed measure
    pub fn sum(mut self, measure: Measure) -> Self {
        self.measures.push(measure);
        self
    }

    /// Rank groups by an already summed measure
    pub fn rank_by(mut self, measure: Measure, order: SortOrder) -> Self {
        self.rank_by = Some((measure, order));
        self
    }

    /// Rank within partitions; dimensions must also be grouped on
    pub fn partition_by(mut self, dimensions: &[Dimension]) -> Self {
        self.partition_by.extend_from_slice(dimensions);
        self
    }

    /// Ranks kept by a ranked query (all of them when unset)
    pub fn limit(mut self, limit: RankLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Force single-threaded aggregation regardless of table size
    pub fn sequential(mut self) -> Self {
        self.parallel = Some(false);
        self
    }

    /// Force rayon aggregation regardless of table size
    pub fn parallel(mut self) -> Self {
        self.parallel = Some(true);
        self
    }

    pub fn execute(self) -> Result<QueryResult, AnalyticsError> {
        if self.group_by.is_empty() {
            return Err(AnalyticsError::InvalidQuery("no group-by dimensions".into()));
        }
        if self.measures.is_empty() {
            return Err(AnalyticsError::InvalidQuery("no measures to sum".into()));
        }
        if self.rank_by.is_none() && (self.limit.is_some() || !self.partition_by.is_empty()) {
            return Err(AnalyticsError::InvalidQuery(
                "limit and partition_by need rank_by".into(),
            ));
        }

        // validate the ranking plan before touching any rows
        let ranker = match self.rank_by {
            Some((measure, order)) => Some(self.plan_ranking(measure, order)?),
            None => None,
        };

        let mut aggregator = Aggregator::new(self.group_by.clone(), self.measures.clone());
        for (dimension, predicate) in &self.filters {
            aggregator = aggregator.with_filter(*dimension, predicate.clone());
        }

        let rows = self.table.rows();
        let grouped = if self
            .parallel
            .unwrap_or(rows.len() >= PARALLEL_THRESHOLD_ROWS)
        {
            aggregator.aggregate_par(rows)?
        } else {
            aggregator.aggregate(rows)?
        };

        match ranker {
            Some(ranker) => Ok(QueryResult::Ranked(ranker.rank(grouped)?)),
            None => Ok(QueryResult::Grouped(grouped)),
        }
    }

    fn plan_ranking(&self, measure: Measure, order: SortOrder) -> Result<Ranker, AnalyticsError> {
        let order_by = self
            .measures
            .iter()
            .position(|m| *m == measure)
            .ok_or_else(|| {
                AnalyticsError::InvalidQuery(format!(
                    "cannot rank by {} which is not summed",
                    measure.name()
                ))
            })?;

        let partition_by = self
            .partition_by
            .iter()
            .map(|d| {
                self.group_by.iter().position(|g| g == d).ok_or_else(|| {
                    AnalyticsError::InvalidQuery(format!(
                        "partition dimension {} is not grouped on",
                        d.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let limit = self.limit.unwrap_or(RankLimit::TopK(usize::MAX));
        Ok(Ranker::new(order_by, order, limit).partition_by(partition_by))
    }
}

impl FactTable {
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self)
    }
}
