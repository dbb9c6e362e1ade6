use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use jemallocator::Jemalloc;
use retail_analytics::{FactTable, ReportConfig, ReportKind, ReportOutput, ReportSession};
use tracing::info;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportArg {
    All,
    TopProducts,
    RegionTopSellers,
    MonthlyGrowth,
    CategoryPeaks,
    SubcategoryGrowth,
}

impl ReportArg {
    fn kinds(self) -> Vec<ReportKind> {
        match self {
            ReportArg::All => ReportKind::ALL.to_vec(),
            ReportArg::TopProducts => vec![ReportKind::TopProducts],
            ReportArg::RegionTopSellers => vec![ReportKind::RegionTopSellers],
            ReportArg::MonthlyGrowth => vec![ReportKind::MonthlyGrowth],
            ReportArg::CategoryPeaks => vec![ReportKind::CategoryPeaks],
            ReportArg::SubcategoryGrowth => vec![ReportKind::SubCategoryGrowth],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "retail-report")]
#[command(version)]
#[command(about = "Business reports over a cleaned retail orders CSV")]
struct Args {
    /// Cleaned orders CSV (one row per order line)
    #[arg(value_name = "CSV")]
    input: PathBuf,

    /// TOML file overriding report parameters
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Which report to run
    #[arg(short, long, value_enum, default_value_t = ReportArg::All)]
    report: ReportArg,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ReportConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ReportConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let mut table = FactTable::new();
    let summary = table
        .load_csv(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    info!(rows = summary.rows_processed, "snapshot ready");

    let session = ReportSession::new(Arc::new(table), config)?;

    let mut outputs = Vec::new();
    for kind in args.report.kinds() {
        let output = session
            .run(kind)
            .with_context(|| format!("report '{kind}' failed"))?;
        outputs.push((kind, output));
    }

    match args.format {
        OutputFormat::Json => {
            let reports: Vec<&ReportOutput> = outputs.iter().map(|(_, o)| o).collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        OutputFormat::Table => {
            for (kind, output) in &outputs {
                println!("== {kind}");
                print_table(output);
                println!();
            }
        }
    }

    Ok(())
}

fn print_table(output: &ReportOutput) {
    match output {
        ReportOutput::TopProducts(rows) => {
            println!("{:<20} {:<18} {:>14} {:>14}", "product_id", "category", "profit", "sales");
            for r in rows {
                println!(
                    "{:<20} {:<18} {:>14} {:>14}",
                    r.product_id, r.category, r.total_profit, r.total_sales
                );
            }
        }
        ReportOutput::RegionTopSellers(rows) => {
            println!("{:<10} {:>4} {:<20} {:>14}", "region", "rank", "product_id", "sales");
            for r in rows {
                println!(
                    "{:<10} {:>4} {:<20} {:>14}",
                    r.region, r.rank, r.product_id, r.total_sales
                );
            }
        }
        ReportOutput::MonthlyGrowth(rows) => {
            let years: Vec<String> = rows
                .first()
                .map(|r| r.sales.iter().map(|v| format!("sales_{}", v.year)).collect())
                .unwrap_or_default();
            print!("{:>5}", "month");
            for y in &years {
                print!(" {:>14}", y);
            }
            println!();
            for r in rows {
                print!("{:>5}", r.month);
                for v in &r.sales {
                    print!(" {:>14}", v.value);
                }
                println!();
            }
        }
        ReportOutput::CategoryPeaks(rows) => {
            println!("{:<18} {:>10} {:>14}", "category", "year_month", "sales");
            for r in rows {
                println!("{:<18} {:>10} {:>14}", r.category, r.year_month, r.total_sales);
            }
        }
        ReportOutput::SubCategoryGrowth(r) => {
            println!(
                "{:<14} {:>14} {:>14} {:>14}",
                "sub_category",
                format!("profit_{}", r.year_a),
                format!("profit_{}", r.year_b),
                "growth"
            );
            println!(
                "{:<14} {:>14} {:>14} {:>14}",
                r.sub_category, r.profit_a, r.profit_b, r.profit_growth
            );
        }
    }
}
