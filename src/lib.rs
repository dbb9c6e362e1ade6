//! # retail-analytics
//!
//! `retail-analytics` answers a fixed set of business questions over a
//! denormalized retail orders fact table (one row per product line of an
//! order). It supports:
//!
//! - Memory-mapped, parallel loading of a cleaned CSV export
//! - Exact fixed-point sums with `rust_decimal` (overflow is an error)
//! - Streaming hash aggregation, sequential or on the rayon pool
//! - Partition-then-sort ranking with a deterministic tie-break
//! - Year-over-year pivots with zero fill and a growth calculator
//! - Cached report results for repeated queries over one snapshot
//!
//! # Reports
//!
//! - **Top revenue products**: sales and profit per (product, category), top 10
//! - **Top sellers per region**: five best products by sales in each region
//! - **Monthly growth**: sales per month, one column per compared year
//! - **Peak month per category**: the best selling year-month of each category
//! - **Profit growth leader**: sub-category with the largest profit increase
//!
//! # Example
//!
//! ```rust,no_run
//! use retail_analytics::{FactTable, ReportConfig, ReportSession};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut table = FactTable::new();
//!     table.load_csv(Path::new("orders.csv"))?;
//!
//!     let session = ReportSession::new(Arc::new(table), ReportConfig::default())?;
//!     for row in session.top_sellers_per_region()? {
//!         println!("{} #{} {} {}", row.region, row.rank, row.product_id, row.total_sales);
//!     }
//!
//!     let leader = session.top_profit_growth_sub_category()?;
//!     println!("{} grew by {}", leader.sub_category, leader.profit_growth);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod processor;

pub use config::ReportConfig;
pub use processor::aggregator::{AggregateRow, Aggregator, HashAggregation};
pub use processor::fact_table::FactTable;
pub use processor::growth::{GrowthCalculator, GrowthRow};
pub use processor::order_line::OrderLine;
pub use processor::pivot::{PeriodPivot, PivotRow, YearValue};
pub use processor::query_builder::{QueryBuilder, QueryCache, QueryKey, QueryResult};
pub use processor::ranker::{RankLimit, RankedRow, Ranker, SortOrder};
pub use processor::reports::{
    CategoryPeakMonth, MonthlyComparison, ProductRevenue, RegionTopSeller, ReportKind,
    ReportOutput, ReportSession, SubCategoryGrowth,
};
pub use processor::{
    AnalyticsError, Dimension, FilterPredicate, GroupKey, KeyValue, Measure, ParseSummary,
};
