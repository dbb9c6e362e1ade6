use chrono::NaiveDate;
use memchr::memchr_iter;
use memmap2::Mmap;
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::{collections::HashMap, fs::File, path::Path, str, str::FromStr, sync::Arc, time::Instant};
use tracing::{debug, info};

use crate::processor::{AnalyticsError, ParseSummary, order_line::OrderLine};

/// Header names every snapshot file must carry, after normalization
pub const REQUIRED_COLUMNS: [&str; 16] = [
    "order_id",
    "order_date",
    "ship_mode",
    "segment",
    "country",
    "city",
    "state",
    "postal_code",
    "region",
    "category",
    "sub_category",
    "product_id",
    "quantity",
    "discount",
    "sale_price",
    "profit",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

// indices into REQUIRED_COLUMNS
const ORDER_ID: usize = 0;
const ORDER_DATE: usize = 1;
const SHIP_MODE: usize = 2;
const SEGMENT: usize = 3;
const COUNTRY: usize = 4;
const CITY: usize = 5;
const STATE: usize = 6;
const POSTAL_CODE: usize = 7;
const REGION: usize = 8;
const CATEGORY: usize = 9;
const SUB_CATEGORY: usize = 10;
const PRODUCT_ID: usize = 11;
const QUANTITY: usize = 12;
const DISCOUNT: usize = 13;
const SALE_PRICE: usize = 14;
const PROFIT: usize = 15;

/// Immutable snapshot of the orders fact table.
///
/// A snapshot is either built from rows the caller already holds
/// ([`FactTable::from_rows`]) or loaded from a cleaned CSV export
/// ([`FactTable::load_csv`]). Either way every row is validated up front and
/// a single bad row rejects the whole snapshot.
///
/// # Examples
///
/// ```rust,no_run
/// # use retail_analytics::FactTable;
/// let mut table = FactTable::new();
/// table.load_csv("orders.csv".as_ref()).unwrap();
/// println!("{} order lines", table.row_count());
/// ```
#[derive(Debug, Clone, Default)]
pub struct FactTable {
    rows: Vec<OrderLine>,
}

/// Position of each required column in the file's header
#[derive(Debug, Clone)]
struct ColumnMap {
    positions: [usize; REQUIRED_COLUMNS.len()],
    width: usize,
}

impl FactTable {
    /// Create an empty snapshot
    pub fn new() -> Self {
        FactTable { rows: Vec::new() }
    }

    /// Wraps rows supplied by an external loader.
    ///
    /// # Errors
    /// [`AnalyticsError::InvalidInput`] naming the first row (1-based) that
    /// breaks an [`OrderLine`] invariant.
    pub fn from_rows(rows: Vec<OrderLine>) -> Result<Self, AnalyticsError> {
        for (i, row) in rows.iter().enumerate() {
            row.validate(i + 1)?;
        }
        Ok(FactTable { rows })
    }

    /// Loads a cleaned CSV export using memory mapping.
    ///
    /// Header names are normalized (trimmed, lowercased, spaces become
    /// underscores), so `Sub Category` and `sub_category` are the same
    /// column. Columns may come in any order and extra columns are ignored.
    /// Lines are parsed in parallel chunks; the snapshot is only replaced
    /// when every line parses.
    ///
    /// # Errors
    /// - [`AnalyticsError::Io`] if the file cannot be opened or mapped
    /// - [`AnalyticsError::MissingColumn`] if a required column is absent
    /// - [`AnalyticsError::InvalidInput`] for the first malformed line, with
    ///   its physical line number
    pub fn load_csv(&mut self, path: &Path) -> Result<ParseSummary, AnalyticsError> {
        let started = Instant::now();
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(AnalyticsError::invalid_input(1, "", "missing header line"));
        }
        let mmap = unsafe { Mmap::map(&file)? };

        let (table, summary) = Self::parse_bytes(&mmap[..])?;
        self.rows = table.rows;

        info!(
            path = %path.display(),
            rows = summary.rows_processed,
            chunks = summary.chunks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded fact table snapshot"
        );
        Ok(summary)
    }

    /// Parses an in-memory CSV buffer with the same rules as
    /// [`FactTable::load_csv`].
    pub fn parse_bytes(buf: &[u8]) -> Result<(Self, ParseSummary), AnalyticsError> {
        let header_end = buf.iter().position(|&b| b == b'\n').unwrap_or(buf.len());
        let header_line = &buf[..header_end];
        if trim_line(header_line).is_empty() {
            return Err(AnalyticsError::invalid_input(1, "", "missing header line"));
        }
        let columns = ColumnMap::from_header(header_line)?;

        let data = if header_end < buf.len() {
            &buf[header_end + 1..]
        } else {
            &[][..]
        };

        let num_threads = rayon::current_num_threads();
        let chunks = Self::find_chunk_boundaries(data, num_threads);

        // physical line number of each chunk's first line; the header is line 1
        let first_lines: Vec<usize> = chunks
            .iter()
            .scan(2usize, |next, &(start, end)| {
                let first = *next;
                *next += memchr_iter(b'\n', &data[start..end]).count();
                Some(first)
            })
            .collect();

        let parsed: Vec<Result<Vec<OrderLine>, AnalyticsError>> = chunks
            .par_iter()
            .zip(first_lines.par_iter())
            .map(|(&(start, end), &first_line)| {
                Self::parse_chunk(&data[start..end], first_line, &columns)
            })
            .collect();

        let mut rows = Vec::with_capacity(parsed.iter().map(|r| r.as_ref().map_or(0, Vec::len)).sum());
        for chunk in parsed {
            rows.extend(chunk?);
        }

        debug!(rows = rows.len(), chunks = chunks.len(), "parsed snapshot buffer");
        let summary = ParseSummary {
            rows_processed: rows.len(),
            chunks: chunks.len(),
        };
        Ok((FactTable { rows }, summary))
    }

    fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
        if data.is_empty() {
            return vec![];
        }

        let num_chunks = num_chunks.max(1);
        let chunk_size = data.len() / num_chunks;
        let mut boundaries = Vec::with_capacity(num_chunks);
        let mut start = 0;

        for i in 0..num_chunks - 1 {
            let mut end = ((i + 1) * chunk_size).max(start);

            // Find next newline
            while end < data.len() && data[end] != b'\n' {
                end += 1;
            }

            if end < data.len() {
                end += 1; // Include the newline
            }

            if start < end {
                boundaries.push((start, end));
            }
            start = end;
        }

        // Last chunk gets everything remaining
        if start < data.len() {
            boundaries.push((start, data.len()));
        }

        boundaries
    }

    fn parse_chunk(
        chunk: &[u8],
        first_line: usize,
        columns: &ColumnMap,
    ) -> Result<Vec<OrderLine>, AnalyticsError> {
        let mut rows = Vec::with_capacity(chunk.len() / 96 + 1);
        let mut interner: HashMap<&[u8], Arc<str>> = HashMap::new();
        let mut fields: Vec<&[u8]> = Vec::with_capacity(columns.width);

        let mut line_no = first_line;
        let mut start = 0;
        let ends = memchr_iter(b'\n', chunk).chain(std::iter::once(chunk.len()));
        for end in ends {
            if start > chunk.len() {
                break;
            }
            let line = trim_line(&chunk[start..end]);
            start = end + 1;
            let current = line_no;
            line_no += 1;

            if line.is_empty() {
                continue;
            }

            fields.clear();
            let mut field_start = 0;
            for comma_pos in memchr_iter(b',', line) {
                fields.push(unquote(&line[field_start..comma_pos]));
                field_start = comma_pos + 1;
            }
            fields.push(unquote(&line[field_start..]));

            if fields.len() != columns.width {
                return Err(AnalyticsError::invalid_input(
                    current,
                    "",
                    format!("expected {} fields, got {}", columns.width, fields.len()),
                ));
            }

            let row = columns.build_row(&fields, current, &mut interner)?;
            row.validate(current)?;
            rows.push(row);
        }

        Ok(rows)
    }

    pub fn rows(&self) -> &[OrderLine] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ColumnMap {
    fn from_header(header_line: &[u8]) -> Result<Self, AnalyticsError> {
        let headers: Vec<String> = trim_line(header_line)
            .split(|&b| b == b',')
            .map(normalize_header)
            .collect();

        let mut positions = [0usize; REQUIRED_COLUMNS.len()];
        for (slot, name) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| AnalyticsError::MissingColumn(name.to_string()))?;
        }

        Ok(ColumnMap {
            positions,
            width: headers.len(),
        })
    }

    fn build_row<'a>(
        &self,
        fields: &[&'a [u8]],
        line: usize,
        interner: &mut HashMap<&'a [u8], Arc<str>>,
    ) -> Result<OrderLine, AnalyticsError> {
        let raw = |col: usize| fields[self.positions[col]];
        let mut text = |col: usize| -> Result<Arc<str>, AnalyticsError> {
            let bytes = raw(col);
            if let Some(shared) = interner.get(bytes) {
                return Ok(shared.clone());
            }
            let s = str::from_utf8(bytes).map_err(|e| {
                AnalyticsError::invalid_input(line, REQUIRED_COLUMNS[col], e.to_string())
            })?;
            let shared: Arc<str> = Arc::from(s.trim());
            interner.insert(bytes, shared.clone());
            Ok(shared)
        };

        Ok(OrderLine {
            order_id: atoi_simd::parse::<u64>(raw(ORDER_ID).trim_ascii())
                .map_err(|e| int_error(raw(ORDER_ID), line, ORDER_ID, e))?,
            order_date: parse_date(raw(ORDER_DATE), line)?,
            ship_mode: text(SHIP_MODE)?,
            segment: text(SEGMENT)?,
            country: text(COUNTRY)?,
            city: text(CITY)?,
            state: text(STATE)?,
            postal_code: text(POSTAL_CODE)?,
            region: text(REGION)?,
            category: text(CATEGORY)?,
            sub_category: text(SUB_CATEGORY)?,
            product_id: text(PRODUCT_ID)?,
            quantity: atoi_simd::parse::<u32>(raw(QUANTITY).trim_ascii())
                .map_err(|e| int_error(raw(QUANTITY), line, QUANTITY, e))?,
            discount: parse_decimal(raw(DISCOUNT), line, DISCOUNT)?,
            sale_price: parse_decimal(raw(SALE_PRICE), line, SALE_PRICE)?,
            profit: parse_decimal(raw(PROFIT), line, PROFIT)?,
        })
    }
}

fn int_error(field: &[u8], line: usize, col: usize, e: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::invalid_input(
        line,
        REQUIRED_COLUMNS[col],
        format!(
            "'{}' is not a valid non-negative integer: {e}",
            String::from_utf8_lossy(field)
        ),
    )
}

fn parse_decimal(field: &[u8], line: usize, col: usize) -> Result<Decimal, AnalyticsError> {
    let invalid = |reason: String| AnalyticsError::invalid_input(line, REQUIRED_COLUMNS[col], reason);
    let s = str::from_utf8(field.trim_ascii()).map_err(|e| invalid(e.to_string()))?;
    if s.is_empty() {
        return Err(invalid("empty numeric field".into()));
    }
    Decimal::from_str(s).map_err(|e| invalid(format!("'{s}' is not a valid decimal: {e}")))
}

fn parse_date(field: &[u8], line: usize) -> Result<NaiveDate, AnalyticsError> {
    let invalid = |reason: String| AnalyticsError::invalid_input(line, REQUIRED_COLUMNS[ORDER_DATE], reason);
    let s = str::from_utf8(field.trim_ascii()).map_err(|e| invalid(e.to_string()))?;
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| invalid(format!("'{s}' is not a date: {e}")))
}

/// `Sub Category` -> `sub_category`
fn normalize_header(raw: &[u8]) -> String {
    String::from_utf8_lossy(unquote(raw))
        .trim()
        .to_lowercase()
        .replace(' ', "_")
}

fn trim_line(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(b'\r') => &line[..line.len() - 1],
        _ => line,
    }
}

fn unquote(field: &[u8]) -> &[u8] {
    let field = field.trim_ascii();
    if field.len() >= 2 && field[0] == b'"' && field[field.len() - 1] == b'"' {
        &field[1..field.len() - 1]
    } else {
        field
    }
}
