//! The five business reports over an orders snapshot.
//!
//! Each report is a pure function of the snapshot plus its parameters.
//! [`ReportSession`] binds a shared snapshot to a [`ReportConfig`] and keeps
//! finished reports in an LRU so repeated requests skip the scan.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::config::ReportConfig;
use crate::processor::fact_table::FactTable;
use crate::processor::growth::{GrowthCalculator, GrowthRow};
use crate::processor::pivot::{PeriodPivot, PivotRow, YearValue};
use crate::processor::query_builder::{QueryCache, QueryKey};
use crate::processor::ranker::{RankLimit, SortOrder};
use crate::processor::{AnalyticsError, Dimension, Measure};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRevenue {
    pub product_id: Arc<str>,
    pub category: Arc<str>,
    pub total_profit: Decimal,
    pub total_sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionTopSeller {
    pub region: Arc<str>,
    pub rank: usize,
    pub product_id: Arc<str>,
    pub total_sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyComparison {
    pub month: u32,
    /// Sales per requested year, rounded to cents
    pub sales: Vec<YearValue>,
}

impl MonthlyComparison {
    pub fn sales_in(&self, year: i32) -> Option<Decimal> {
        self.sales.iter().find(|v| v.year == year).map(|v| v.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryPeakMonth {
    pub category: Arc<str>,
    /// `YYYYMM`
    pub year_month: u32,
    pub total_sales: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubCategoryGrowth {
    pub sub_category: Arc<str>,
    pub year_a: i32,
    pub profit_a: Decimal,
    pub year_b: i32,
    pub profit_b: Decimal,
    pub profit_growth: Decimal,
}

/// Top `limit` (product, category) pairs by total sales
pub fn top_revenue_products(
    table: &FactTable,
    limit: usize,
) -> Result<Vec<ProductRevenue>, AnalyticsError> {
    let ranked = table
        .query()
        .group_by(&[Dimension::ProductId, Dimension::Category])
        .sum(Measure::Profit)
        .sum(Measure::SalePrice)
        .rank_by(Measure::SalePrice, SortOrder::Descending)
        .limit(RankLimit::TopK(limit))
        .execute()?
        .into_ranked()?;

    ranked
        .into_iter()
        .map(|r| {
            Ok(ProductRevenue {
                product_id: r.row.key.text(0)?,
                category: r.row.key.text(1)?,
                total_profit: r.row.measure(0)?,
                total_sales: r.row.measure(1)?,
            })
        })
        .collect()
}

/// Best `per_region` products by sales inside every region
pub fn top_sellers_per_region(
    table: &FactTable,
    per_region: usize,
) -> Result<Vec<RegionTopSeller>, AnalyticsError> {
    let ranked = table
        .query()
        .group_by(&[Dimension::Region, Dimension::ProductId])
        .sum(Measure::SalePrice)
        .rank_by(Measure::SalePrice, SortOrder::Descending)
        .partition_by(&[Dimension::Region])
        .limit(RankLimit::TopK(per_region))
        .execute()?
        .into_ranked()?;

    ranked
        .into_iter()
        .map(|r| {
            Ok(RegionTopSeller {
                region: r.row.key.text(0)?,
                rank: r.rank,
                product_id: r.row.key.text(1)?,
                total_sales: r.row.measure(0)?,
            })
        })
        .collect()
}

/// Monthly sales with one column per year in `years`
pub fn monthly_sales_comparison(
    table: &FactTable,
    years: &[i32],
) -> Result<Vec<MonthlyComparison>, AnalyticsError> {
    let grouped = table
        .query()
        .group_by(&[Dimension::Year, Dimension::Month])
        .sum(Measure::SalePrice)
        .execute()?
        .into_grouped()?;

    PeriodPivot::new(vec![1], 0, 0, years.to_vec())
        .pivot(&grouped)?
        .into_iter()
        .map(|row| {
            let month = row.period.int(0)?;
            Ok(MonthlyComparison {
                month: u32::try_from(month).map_err(|_| {
                    AnalyticsError::InvalidQuery(format!("month {month} out of range"))
                })?,
                sales: row.columns,
            })
        })
        .collect()
}

/// Month with the highest sales for every category
pub fn peak_month_per_category(
    table: &FactTable,
) -> Result<Vec<CategoryPeakMonth>, AnalyticsError> {
    let ranked = table
        .query()
        .group_by(&[Dimension::Category, Dimension::YearMonth])
        .sum(Measure::SalePrice)
        .rank_by(Measure::SalePrice, SortOrder::Descending)
        .partition_by(&[Dimension::Category])
        .limit(RankLimit::First)
        .execute()?
        .into_ranked()?;

    ranked
        .into_iter()
        .map(|r| {
            let year_month = r.row.key.int(1)?;
            Ok(CategoryPeakMonth {
                category: r.row.key.text(0)?,
                year_month: u32::try_from(year_month).map_err(|_| {
                    AnalyticsError::InvalidQuery(format!("year-month {year_month} out of range"))
                })?,
                total_sales: r.row.measure(0)?,
            })
        })
        .collect()
}

/// Profit growth from `year_a` to `year_b` for every sub-category, largest
/// first
pub fn profit_growth_by_sub_category(
    table: &FactTable,
    year_a: i32,
    year_b: i32,
) -> Result<Vec<SubCategoryGrowth>, AnalyticsError> {
    let pivoted = sub_category_profit_pivot(table, year_a, year_b)?;
    GrowthCalculator::new(year_a, year_b)
        .ranked(&pivoted)?
        .into_iter()
        .map(|g| sub_category_growth(g, year_a, year_b))
        .collect()
}

/// The sub-category whose profit grew most from `year_a` to `year_b`
///
/// # Errors
/// [`AnalyticsError::EmptyResult`] when the snapshot holds no rows.
pub fn top_profit_growth_sub_category(
    table: &FactTable,
    year_a: i32,
    year_b: i32,
) -> Result<SubCategoryGrowth, AnalyticsError> {
    let pivoted = sub_category_profit_pivot(table, year_a, year_b)?;
    let best = GrowthCalculator::new(year_a, year_b).max(&pivoted)?;
    sub_category_growth(best, year_a, year_b)
}

fn sub_category_profit_pivot(
    table: &FactTable,
    year_a: i32,
    year_b: i32,
) -> Result<Vec<PivotRow>, AnalyticsError> {
    if year_a == year_b {
        return Err(AnalyticsError::InvalidQuery(format!(
            "growth needs two different years, got {year_a} twice"
        )));
    }

    let grouped = table
        .query()
        .group_by(&[Dimension::SubCategory, Dimension::Year])
        .sum(Measure::Profit)
        .execute()?
        .into_grouped()?;

    PeriodPivot::new(vec![0], 1, 0, vec![year_a, year_b]).pivot(&grouped)
}

fn sub_category_growth(
    g: GrowthRow,
    year_a: i32,
    year_b: i32,
) -> Result<SubCategoryGrowth, AnalyticsError> {
    Ok(SubCategoryGrowth {
        sub_category: g.period.text(0)?,
        year_a,
        profit_a: g.value_a,
        year_b,
        profit_b: g.value_b,
        profit_growth: g.growth,
    })
}

/// The reports a session can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    TopProducts,
    RegionTopSellers,
    MonthlyGrowth,
    CategoryPeaks,
    SubCategoryGrowth,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::TopProducts,
        ReportKind::RegionTopSellers,
        ReportKind::MonthlyGrowth,
        ReportKind::CategoryPeaks,
        ReportKind::SubCategoryGrowth,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ReportKind::TopProducts => "Top revenue products",
            ReportKind::RegionTopSellers => "Top sellers per region",
            ReportKind::MonthlyGrowth => "Month-over-month sales by year",
            ReportKind::CategoryPeaks => "Peak sales month per category",
            ReportKind::SubCategoryGrowth => "Highest profit growth sub-category",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// A finished report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", content = "rows", rename_all = "snake_case")]
pub enum ReportOutput {
    TopProducts(Vec<ProductRevenue>),
    RegionTopSellers(Vec<RegionTopSeller>),
    MonthlyGrowth(Vec<MonthlyComparison>),
    CategoryPeaks(Vec<CategoryPeakMonth>),
    SubCategoryGrowth(SubCategoryGrowth),
}

/// A snapshot, the parameters to query it with, and an optional report cache
#[derive(Debug)]
pub struct ReportSession {
    table: Arc<FactTable>,
    config: ReportConfig,
    cache: Option<QueryCache>,
}

impl ReportSession {
    /// The cache is sized by `config.cache_capacity`; zero disables it
    pub fn new(table: Arc<FactTable>, config: ReportConfig) -> Result<Self, AnalyticsError> {
        config.validate()?;
        let cache = NonZeroUsize::new(config.cache_capacity).map(QueryCache::new);
        Ok(Self {
            table,
            config,
            cache,
        })
    }

    pub fn table(&self) -> &FactTable {
        &self.table
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn cached_reports(&self) -> usize {
        self.cache.as_ref().map_or(0, QueryCache::len)
    }

    pub fn run(&self, kind: ReportKind) -> Result<ReportOutput, AnalyticsError> {
        let key = self.key_for(kind);
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            debug!(report = %kind, "report served from cache");
            return Ok(hit);
        }

        let output = self.execute(&key)?;
        if let Some(cache) = &self.cache {
            cache.put(key, output.clone());
        }
        Ok(output)
    }

    pub fn top_revenue_products(&self) -> Result<Vec<ProductRevenue>, AnalyticsError> {
        match self.run(ReportKind::TopProducts)? {
            ReportOutput::TopProducts(rows) => Ok(rows),
            other => Err(unexpected(ReportKind::TopProducts, &other)),
        }
    }

    pub fn top_sellers_per_region(&self) -> Result<Vec<RegionTopSeller>, AnalyticsError> {
        match self.run(ReportKind::RegionTopSellers)? {
            ReportOutput::RegionTopSellers(rows) => Ok(rows),
            other => Err(unexpected(ReportKind::RegionTopSellers, &other)),
        }
    }

    pub fn monthly_sales_comparison(&self) -> Result<Vec<MonthlyComparison>, AnalyticsError> {
        match self.run(ReportKind::MonthlyGrowth)? {
            ReportOutput::MonthlyGrowth(rows) => Ok(rows),
            other => Err(unexpected(ReportKind::MonthlyGrowth, &other)),
        }
    }

    pub fn peak_month_per_category(&self) -> Result<Vec<CategoryPeakMonth>, AnalyticsError> {
        match self.run(ReportKind::CategoryPeaks)? {
            ReportOutput::CategoryPeaks(rows) => Ok(rows),
            other => Err(unexpected(ReportKind::CategoryPeaks, &other)),
        }
    }

    pub fn top_profit_growth_sub_category(&self) -> Result<SubCategoryGrowth, AnalyticsError> {
        match self.run(ReportKind::SubCategoryGrowth)? {
            ReportOutput::SubCategoryGrowth(row) => Ok(row),
            other => Err(unexpected(ReportKind::SubCategoryGrowth, &other)),
        }
    }

    fn key_for(&self, kind: ReportKind) -> QueryKey {
        let c = &self.config;
        match kind {
            ReportKind::TopProducts => QueryKey::TopProducts {
                limit: c.top_products,
            },
            ReportKind::RegionTopSellers => QueryKey::RegionTopSellers {
                per_region: c.top_sellers_per_region,
            },
            ReportKind::MonthlyGrowth => QueryKey::MonthlyGrowth {
                years: vec![c.baseline_year, c.comparison_year],
            },
            ReportKind::CategoryPeaks => QueryKey::CategoryPeaks,
            ReportKind::SubCategoryGrowth => QueryKey::SubCategoryGrowth {
                year_a: c.baseline_year,
                year_b: c.comparison_year,
            },
        }
    }

    fn execute(&self, key: &QueryKey) -> Result<ReportOutput, AnalyticsError> {
        let table = self.table.as_ref();
        Ok(match key {
            QueryKey::TopProducts { limit } => {
                ReportOutput::TopProducts(top_revenue_products(table, *limit)?)
            }
            QueryKey::RegionTopSellers { per_region } => {
                ReportOutput::RegionTopSellers(top_sellers_per_region(table, *per_region)?)
            }
            QueryKey::MonthlyGrowth { years } => {
                ReportOutput::MonthlyGrowth(monthly_sales_comparison(table, years)?)
            }
            QueryKey::CategoryPeaks => ReportOutput::CategoryPeaks(peak_month_per_category(table)?),
            QueryKey::SubCategoryGrowth { year_a, year_b } => ReportOutput::SubCategoryGrowth(
                top_profit_growth_sub_category(table, *year_a, *year_b)?,
            ),
        })
    }
}

fn unexpected(kind: ReportKind, output: &ReportOutput) -> AnalyticsError {
    AnalyticsError::InvalidQuery(format!("{kind} produced a mismatched output: {output:?}"))
}
