use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use retail_analytics::FactTable;

const REGIONS: [&str; 4] = ["East", "West", "Central", "South"];
const PRODUCTS: [(&str, &str, &str); 6] = [
    ("Furniture", "Chairs", "FUR-CH"),
    ("Furniture", "Tables", "FUR-TA"),
    ("Office Supplies", "Binders", "OFF-BI"),
    ("Office Supplies", "Paper", "OFF-PA"),
    ("Technology", "Phones", "TEC-PH"),
    ("Technology", "Machines", "TEC-MA"),
];

/// Deterministic synthetic orders CSV with `rows` data lines
pub fn synthetic_csv(rows: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut out = String::with_capacity(rows * 140);
    out.push_str("order_id,order_date,ship_mode,segment,country,city,state,postal_code,region,category,sub_category,product_id,quantity,discount,sale_price,profit\n");
    for i in 0..rows {
        let (category, sub_category, prefix) = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        let sale: i64 = rng.random_range(100..50_000);
        let profit: i64 = rng.random_range(-5_000..10_000);
        out.push_str(&format!(
            "{},{}-{:02}-{:02},Standard Class,Consumer,United States,Springfield,Illinois,62701,{},{},{},{}-{:04},{},0.00,{}.{:02},{}{}.{:02}\n",
            i / 3 + 1,
            rng.random_range(2022..=2023),
            rng.random_range(1..=12),
            rng.random_range(1..=28),
            REGIONS[rng.random_range(0..REGIONS.len())],
            category,
            sub_category,
            prefix,
            rng.random_range(0..500),
            rng.random_range(1..=10),
            sale / 100,
            sale % 100,
            if profit < 0 { "-" } else { "" },
            profit.abs() / 100,
            profit.abs() % 100,
        ));
    }
    out.into_bytes()
}

pub fn synthetic_table(rows: usize) -> FactTable {
    let (table, _) = FactTable::parse_bytes(&synthetic_csv(rows)).unwrap();
    table
}
