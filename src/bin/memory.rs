use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use retail_analytics::{FactTable, ReportConfig, ReportKind, ReportSession};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Heap profile of loading a snapshot and running every report once.
///
/// Usage: `memory [PATH]`
fn main() -> Result<()> {
    let _profiler = dhat::Profiler::new_heap();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/orders.csv"));

    let mut table = FactTable::new();
    table
        .load_csv(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    let session = ReportSession::new(Arc::new(table), ReportConfig::default())?;
    for kind in ReportKind::ALL {
        session.run(kind)?;
    }

    println!("Memory benchmark finished. See dhat-heap.json for details");
    Ok(())
}
