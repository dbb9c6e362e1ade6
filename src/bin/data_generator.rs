use anyhow::{Context, Result};
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};

const REGIONS: [(&str, &str, &str, &str); 4] = [
    ("East", "New York City", "New York", "10024"),
    ("West", "Los Angeles", "California", "90036"),
    ("Central", "Chicago", "Illinois", "60610"),
    ("South", "Houston", "Texas", "77095"),
];

const PRODUCTS: [(&str, &str, &str); 8] = [
    ("Furniture", "Chairs", "FUR-CH"),
    ("Furniture", "Tables", "FUR-TA"),
    ("Furniture", "Bookcases", "FUR-BO"),
    ("Office Supplies", "Binders", "OFF-BI"),
    ("Office Supplies", "Paper", "OFF-PA"),
    ("Office Supplies", "Storage", "OFF-ST"),
    ("Technology", "Phones", "TEC-PH"),
    ("Technology", "Machines", "TEC-MA"),
];

const SHIP_MODES: [&str; 4] = ["Standard Class", "Second Class", "First Class", "Same Day"];
const SEGMENTS: [&str; 3] = ["Consumer", "Corporate", "Home Office"];

/// Writes a synthetic cleaned orders CSV.
///
/// Usage: `data_generator [ROWS] [PATH]`
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let rows: u64 = match args.next() {
        Some(v) => v.parse().with_context(|| format!("invalid row count '{v}'"))?,
        None => 1_000_000,
    };
    let path = args.next().unwrap_or_else(|| "data/orders.csv".to_string());

    let file = File::create(&path).with_context(|| format!("cannot create {path}"))?;
    let mut writer = BufWriter::new(file);

    writeln!(
        writer,
        "order_id,order_date,ship_mode,segment,country,city,state,postal_code,region,category,sub_category,product_id,quantity,discount,sale_price,profit"
    )?;

    let mut rng = rand::rng();
    for i in 0..rows {
        let order_id = i / 3 + 1;
        let year = rng.random_range(2022..=2023);
        let month = rng.random_range(1..=12);
        let day = rng.random_range(1..=28);
        let (region, city, state, postal) = REGIONS[rng.random_range(0..REGIONS.len())];
        let (category, sub_category, prefix) = PRODUCTS[rng.random_range(0..PRODUCTS.len())];
        let product_id = format!("{prefix}-{:04}", rng.random_range(0..200));
        let quantity: u32 = rng.random_range(1..=10);

        // all money in cents so every field carries exactly two decimals
        let list_cents: i64 = rng.random_range(100..50_000);
        let discount_cents = list_cents * rng.random_range(0..=20) / 100;
        let sale_cents = list_cents - discount_cents;
        let profit_cents = sale_cents * rng.random_range(-30..=40) / 100;

        writeln!(
            writer,
            "{order_id},{year}-{month:02}-{day:02},{},{},United States,{city},{state},{postal},{region},{category},{sub_category},{product_id},{quantity},{},{},{}",
            SHIP_MODES[rng.random_range(0..SHIP_MODES.len())],
            SEGMENTS[rng.random_range(0..SEGMENTS.len())],
            cents(discount_cents),
            cents(sale_cents),
            cents(profit_cents),
        )?;
    }
    writer.flush()?;

    println!("Sample CSV generated: {path} ({rows} rows)");
    Ok(())
}

fn cents(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
