//! Transaction file loading using Polars (delimited text) and Calamine (spreadsheets)

use crate::error::{Result, SegmentError};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use rust_decimal::Decimal;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Columns every input file must carry (case-sensitive)
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "InvoiceNo",
    "StockCode",
    "Description",
    "Quantity",
    "InvoiceDate",
    "UnitPrice",
    "CustomerID",
    "Country",
];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// One raw row of the sales log
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    /// Invoice number; a leading `C` conventionally marks a cancellation
    pub invoice_id: String,
    pub stock_code: String,
    pub description: String,
    /// Signed; returns carry a negative quantity
    pub quantity: i64,
    pub unit_price: Decimal,
    /// `None` when the cell was blank, or unreadable on a row that cleaning drops
    pub invoice_timestamp: Option<NaiveDateTime>,
    /// `None` for anonymous/guest transactions
    pub customer_id: Option<i64>,
    pub country: String,
}

impl TransactionRecord {
    /// `quantity * unit_price`, or `None` when the product leaves the decimal range
    pub fn line_amount(&self) -> Option<Decimal> {
        Decimal::from(self.quantity).checked_mul(self.unit_price)
    }
}

/// Supported input containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Delimited,
    Spreadsheet,
}

impl InputFormat {
    /// Pick the format from the file extension.
    pub fn detect(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());

        match extension.as_deref() {
            Some("csv" | "tsv" | "txt") => Ok(InputFormat::Delimited),
            Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Ok(InputFormat::Spreadsheet),
            _ => Err(SegmentError::UnsupportedInputFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Parsed rows of one uploaded file
#[derive(Debug, Clone, Default)]
pub struct TransactionBatch {
    pub records: Vec<TransactionRecord>,
    /// Data rows present in the file (header excluded)
    pub rows_read: usize,
    /// Rows dropped at ingest because Quantity or UnitPrice was blank
    pub rows_skipped_blank: usize,
}

/// Load a transaction file into typed records
///
/// # Arguments
/// * `path` - CSV/TSV/TXT or spreadsheet file
///
/// # Returns
/// * `TransactionBatch` with every parseable row, in file order
pub fn load_transactions(path: &Path) -> Result<TransactionBatch> {
    let frame = match InputFormat::detect(path)? {
        InputFormat::Delimited => {
            let bytes = std::fs::read(path)?;
            read_delimited(&bytes)?
        }
        InputFormat::Spreadsheet => read_spreadsheet(path)?,
    };

    let batch = records_from_frame(&frame)?;
    info!(
        path = %path.display(),
        rows = batch.rows_read,
        records = batch.records.len(),
        "Transactions loaded"
    );
    Ok(batch)
}

/// Parse delimited text into an all-string DataFrame.
///
/// The delimiter is sniffed from the header line.
pub fn read_delimited(bytes: &[u8]) -> Result<DataFrame> {
    let text = decode_text(bytes);
    let separator = sniff_separator(&text);
    debug!(separator = %char::from(separator).escape_default(), "Reading delimited input");

    let frame = CsvReadOptions::default()
        .with_has_header(true)
        // Keep every column as text; typing happens per row below
        .with_infer_schema_length(Some(0))
        .map_parse_options(|opts| opts.with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    Ok(frame)
}

/// Decode as UTF-8 when valid, otherwise as ISO-8859-1.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        // Latin-1 maps every byte to the code point of the same value
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Choose among `,`, `;` and tab by frequency in the header line.
pub fn sniff_separator(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    [b',', b';', b'\t']
        .into_iter()
        .map(|sep| (sep, header.bytes().filter(|&b| b == sep).count()))
        .fold((b',', 0), |best, candidate| {
            if candidate.1 > best.1 {
                candidate
            } else {
                best
            }
        })
        .0
}

/// Read the first worksheet into an all-string DataFrame, first row as header.
fn read_spreadsheet(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SegmentError::Spreadsheet(calamine::Error::Msg(
            "workbook contains no worksheets",
        )))??;

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(DataFrame::empty());
    };

    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(idx, cell)| cell_to_string(cell).unwrap_or_else(|| format!("column_{idx}")))
        .collect();

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (idx, column) in columns.iter_mut().enumerate() {
            column.push(row.get(idx).and_then(cell_to_string));
        }
    }

    let series: Vec<Series> = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new(name, values))
        .collect();

    Ok(DataFrame::new(series)?)
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        Data::Int(v) => Some(v.to_string()),
        Data::Float(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(v) => v
            .as_datetime()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::Error(e) => Some(e.to_string()),
    }
}

/// Convert an all-string frame into typed records.
pub fn records_from_frame(frame: &DataFrame) -> Result<TransactionBatch> {
    let names = frame.get_column_names();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !names.contains(*required))
        .map(|required| required.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SegmentError::MissingRequiredColumn { missing });
    }

    let invoice = text_cells(frame, "InvoiceNo")?;
    let stock = text_cells(frame, "StockCode")?;
    let description = text_cells(frame, "Description")?;
    let quantities = text_cells(frame, "Quantity")?;
    let invoice_date = text_cells(frame, "InvoiceDate")?;
    let prices = text_cells(frame, "UnitPrice")?;
    let customer = text_cells(frame, "CustomerID")?;
    let country = text_cells(frame, "Country")?;

    let mut batch = TransactionBatch {
        records: Vec::with_capacity(frame.height()),
        rows_read: frame.height(),
        rows_skipped_blank: 0,
    };

    for idx in 0..frame.height() {
        let row = idx + 1;
        // A blank amount can never make a sale
        let (Some(qty), Some(price)) = (non_blank(quantities[idx]), non_blank(prices[idx]))
        else {
            batch.rows_skipped_blank += 1;
            continue;
        };

        let quantity = parse_quantity(qty).ok_or_else(|| invalid(row, "Quantity", qty))?;
        let unit_price = parse_decimal(price).ok_or_else(|| invalid(row, "UnitPrice", price))?;

        // Returns and zero-price rows are dropped by cleaning, so their
        // customer and date cells are read leniently
        let is_sale = quantity > 0 && unit_price > Decimal::ZERO;
        let customer_id = optional_cell(
            customer[idx],
            parse_customer_id,
            is_sale.then_some((row, "CustomerID")),
        )?;
        let invoice_timestamp = optional_cell(
            invoice_date[idx],
            parse_timestamp,
            (is_sale && customer_id.is_some()).then_some((row, "InvoiceDate")),
        )?;

        batch.records.push(TransactionRecord {
            invoice_id: owned(invoice[idx]),
            stock_code: owned(stock[idx]),
            description: owned(description[idx]),
            quantity,
            unit_price,
            invoice_timestamp,
            customer_id,
            country: owned(country[idx]),
        });
    }

    if batch.rows_skipped_blank > 0 {
        warn!(
            skipped = batch.rows_skipped_blank,
            "Rows with blank Quantity or UnitPrice skipped"
        );
    }

    Ok(batch)
}

/// Parse an optional cell. With `strict` set to the cell's row and column, a
/// non-blank value that does not parse is an error; otherwise it reads as `None`.
fn optional_cell<T>(
    cell: Option<&str>,
    parse: fn(&str) -> Option<T>,
    strict: Option<(usize, &'static str)>,
) -> Result<Option<T>> {
    let Some(raw) = non_blank(cell) else {
        return Ok(None);
    };
    match (parse(raw), strict) {
        (Some(value), _) => Ok(Some(value)),
        (None, Some((row, column))) => Err(invalid(row, column, raw)),
        (None, None) => Ok(None),
    }
}

fn text_cells<'a>(frame: &'a DataFrame, name: &str) -> Result<Vec<Option<&'a str>>> {
    let column = frame.column(name)?;
    Ok(column.str()?.into_iter().collect())
}

fn non_blank(cell: Option<&str>) -> Option<&str> {
    cell.map(str::trim).filter(|value| !value.is_empty())
}

fn owned(cell: Option<&str>) -> String {
    cell.map(|value| value.trim().to_string()).unwrap_or_default()
}

fn invalid(row: usize, column: &'static str, value: &str) -> SegmentError {
    SegmentError::InvalidField {
        row,
        column,
        value: value.to_string(),
    }
}

/// Integer, or a float with no fractional part (`6.0`).
fn parse_whole_number(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

pub(crate) fn parse_quantity(raw: &str) -> Option<i64> {
    parse_whole_number(raw)
}

pub(crate) fn parse_customer_id(raw: &str) -> Option<i64> {
    parse_whole_number(raw)
}

pub(crate) fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse the timestamp layouts seen in sales exports; results are timezone-free.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
