use std::io::Write;
use std::sync::Arc;

use retail_analytics::processor::reports;
use retail_analytics::{
    AnalyticsError, FactTable, ReportConfig, ReportKind, ReportOutput, ReportSession,
};
use rust_decimal::Decimal;
use tempfile::NamedTempFile;

const HEADER: &str = "order_id,order_date,ship_mode,segment,country,city,state,postal_code,region,category,sub_category,product_id,quantity,discount,sale_price,profit\n";

#[allow(clippy::too_many_arguments)]
fn order(
    id: u64,
    date: &str,
    region: &str,
    category: &str,
    sub_category: &str,
    product: &str,
    sale: &str,
    profit: &str,
) -> String {
    format!(
        "{id},{date},Standard Class,Consumer,United States,Springfield,Illinois,62701,{region},{category},{sub_category},{product},1,0.00,{sale},{profit}\n"
    )
}

fn sample_lines() -> Vec<String> {
    vec![
        order(1, "2022-01-15", "East", "Furniture", "Chairs", "FUR-1", "100.00", "10.00"),
        order(2, "2023-01-20", "East", "Furniture", "Chairs", "FUR-1", "150.00", "30.00"),
        order(3, "2022-02-10", "West", "Technology", "Phones", "TEC-1", "400.00", "-20.00"),
        order(4, "2023-02-11", "West", "Technology", "Phones", "TEC-1", "300.00", "50.00"),
        order(5, "2023-02-12", "East", "Furniture", "Tables", "FUR-2", "250.00", "5.00"),
        order(6, "2022-03-01", "East", "Office Supplies", "Paper", "OFF-1", "20.00", "8.00"),
        order(7, "2023-03-05", "West", "Office Supplies", "Paper", "OFF-1", "25.00", "9.00"),
    ]
}

fn load(lines: &[String]) -> Result<FactTable, AnalyticsError> {
    let mut tmp = NamedTempFile::new().unwrap();
    write!(tmp, "{HEADER}{}", lines.concat()).unwrap();

    let mut table = FactTable::new();
    table.load_csv(tmp.path())?;
    Ok(table)
}

fn session(table: FactTable) -> ReportSession {
    ReportSession::new(Arc::new(table), ReportConfig::default()).unwrap()
}

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[test]
fn test_top_revenue_products_end_to_end() {
    let session = session(load(&sample_lines()).unwrap());
    let rows = session.top_revenue_products().unwrap();

    let summary: Vec<(&str, &str, Decimal, Decimal)> = rows
        .iter()
        .map(|r| (&*r.product_id, &*r.category, r.total_sales, r.total_profit))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("TEC-1", "Technology", d("700.00"), d("30.00")),
            // equal sales: the lower product id ranks first
            ("FUR-1", "Furniture", d("250.00"), d("40.00")),
            ("FUR-2", "Furniture", d("250.00"), d("5.00")),
            ("OFF-1", "Office Supplies", d("45.00"), d("17.00")),
        ]
    );
}

#[test]
fn test_region_with_fewer_products_than_limit() {
    let session = session(load(&sample_lines()).unwrap());
    let rows = session.top_sellers_per_region().unwrap();

    let east: Vec<(usize, &str)> = rows
        .iter()
        .filter(|r| &*r.region == "East")
        .map(|r| (r.rank, &*r.product_id))
        .collect();
    assert_eq!(east, vec![(1, "FUR-1"), (2, "FUR-2"), (3, "OFF-1")]);

    let west: Vec<(usize, &str, Decimal)> = rows
        .iter()
        .filter(|r| &*r.region == "West")
        .map(|r| (r.rank, &*r.product_id, r.total_sales))
        .collect();
    assert_eq!(west, vec![(1, "TEC-1", d("700.00")), (2, "OFF-1", d("25.00"))]);

    // regions come out in ascending order
    assert_eq!(&*rows[0].region, "East");
}

#[test]
fn test_monthly_comparison_end_to_end() {
    let session = session(load(&sample_lines()).unwrap());
    let rows = session.monthly_sales_comparison().unwrap();

    let months: Vec<u32> = rows.iter().map(|r| r.month).collect();
    assert_eq!(months, vec![1, 2, 3]);
    assert_eq!(rows[1].sales_in(2022), Some(d("400.00")));
    assert_eq!(rows[1].sales_in(2023), Some(d("550.00")));
    assert_eq!(rows[2].sales_in(2022), Some(d("20.00")));
    assert_eq!(rows[2].sales_in(2021), None);
}

#[test]
fn test_category_peaks_end_to_end() {
    let session = session(load(&sample_lines()).unwrap());
    let rows = session.peak_month_per_category().unwrap();

    let peaks: Vec<(&str, u32, Decimal)> = rows
        .iter()
        .map(|r| (&*r.category, r.year_month, r.total_sales))
        .collect();
    assert_eq!(
        peaks,
        vec![
            ("Furniture", 202302, d("250.00")),
            ("Office Supplies", 202303, d("25.00")),
            ("Technology", 202202, d("400.00")),
        ]
    );
}

#[test]
fn test_profit_growth_leader_end_to_end() {
    let table = load(&sample_lines()).unwrap();

    let all = reports::profit_growth_by_sub_category(&table, 2022, 2023).unwrap();
    let growth: Vec<(&str, Decimal)> = all
        .iter()
        .map(|g| (&*g.sub_category, g.profit_growth))
        .collect();
    assert_eq!(
        growth,
        vec![
            ("Phones", d("70.00")),
            ("Chairs", d("20.00")),
            // no 2022 profit: zero-filled
            ("Tables", d("5.00")),
            ("Paper", d("1.00")),
        ]
    );

    let leader = session(table).top_profit_growth_sub_category().unwrap();
    assert_eq!(&*leader.sub_category, "Phones");
    assert_eq!(leader.profit_a, d("-20.00"));
    assert_eq!(leader.profit_b, d("50.00"));
}

#[test]
fn test_results_do_not_depend_on_row_order() {
    let lines = sample_lines();
    let mut reversed = lines.clone();
    reversed.reverse();

    let forward = session(load(&lines).unwrap());
    let backward = session(load(&reversed).unwrap());

    for kind in ReportKind::ALL {
        assert_eq!(forward.run(kind).unwrap(), backward.run(kind).unwrap());
    }
}

#[test]
fn test_header_only_snapshot() {
    let session = session(load(&[]).unwrap());

    assert!(session.top_revenue_products().unwrap().is_empty());
    assert!(session.top_sellers_per_region().unwrap().is_empty());
    assert!(session.monthly_sales_comparison().unwrap().is_empty());
    assert!(session.peak_month_per_category().unwrap().is_empty());
    assert!(matches!(
        session.top_profit_growth_sub_category(),
        Err(AnalyticsError::EmptyResult(_))
    ));
}

#[test]
fn test_invalid_row_rejects_whole_snapshot() {
    let mut lines = sample_lines();
    lines.push(order(8, "2023-13-01", "East", "Furniture", "Chairs", "FUR-1", "1.00", "1.00"));

    match load(&lines) {
        Err(AnalyticsError::InvalidInput { row, column, .. }) => {
            assert_eq!(row, 9);
            assert_eq!(column, "order_date");
        }
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

#[test]
fn test_concurrent_reports_share_one_session() {
    let session = session(load(&sample_lines()).unwrap());
    let expected: Vec<ReportOutput> = ReportKind::ALL
        .iter()
        .map(|&k| reports_without_cache(&session, k))
        .collect();

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for (kind, want) in ReportKind::ALL.iter().zip(&expected) {
                    assert_eq!(&session.run(*kind).unwrap(), want);
                }
            });
        }
    });

    assert_eq!(session.cached_reports(), ReportKind::ALL.len());
}

fn reports_without_cache(session: &ReportSession, kind: ReportKind) -> ReportOutput {
    let config = ReportConfig {
        cache_capacity: 0,
        ..session.config().clone()
    };
    let table = Arc::new(session.table().clone());
    ReportSession::new(table, config).unwrap().run(kind).unwrap()
}

#[test]
fn test_json_output_shape() {
    let session = session(load(&sample_lines()).unwrap());
    let output = session.run(ReportKind::SubCategoryGrowth).unwrap();

    let json = serde_json::to_value(&output).unwrap();
    assert_eq!(json["report"], "sub_category_growth");
    assert_eq!(json["rows"]["sub_category"], "Phones");
}
