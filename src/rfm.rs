//! Record cleaning and RFM (Recency, Frequency, Monetary) aggregation using Polars

use crate::data::TransactionRecord;
use crate::error::{Result, SegmentError};
use crate::schema::{Feature, RFM_FEATURES};
use chrono::{DateTime, Duration, NaiveDateTime};
use ndarray::Array1;
use polars::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// A transaction that passed cleaning: known customer, positive quantity and price
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransaction {
    pub customer_id: i64,
    pub invoice_id: String,
    /// `None` when the source cell was blank
    pub invoice_timestamp: Option<NaiveDateTime>,
    /// Always positive
    pub line_amount: Decimal,
}

/// Behavioral profile of one customer within a batch
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRfmProfile {
    pub customer_id: i64,
    /// Whole days between the last purchase and the snapshot date (>= 1)
    pub recency: i64,
    /// Number of distinct invoices
    pub frequency: u64,
    /// Sum of line amounts
    pub monetary: Decimal,
}

impl CustomerRfmProfile {
    /// Feature vector laid out as [`RFM_FEATURES`]
    pub fn feature_vector(&self) -> Array1<f64> {
        let values: Vec<f64> = RFM_FEATURES
            .iter()
            .map(|feature| match feature {
                Feature::Recency => self.recency as f64,
                Feature::Frequency => self.frequency as f64,
                Feature::Monetary => self.monetary.to_f64().unwrap_or(f64::NAN),
            })
            .collect();
        Array1::from(values)
    }
}

/// Keep only economically valid rows.
///
/// Rows without a customer, with `quantity <= 0` (returns, cancellations) or with
/// `unit_price <= 0` are dropped silently. An empty result is not an error; a
/// line amount outside the decimal range is.
pub fn clean_records(records: &[TransactionRecord]) -> Result<Vec<ValidTransaction>> {
    let kept = records_frame(records)?
        .lazy()
        .filter(
            col("Quantity")
                .gt(lit(0))
                .and(col("UnitPrice").gt(lit(0.0)))
                .and(col("CustomerID").is_not_null()),
        )
        .select([col("Row")])
        .collect()?;

    let mut cleaned = Vec::with_capacity(kept.height());
    for row in kept.column("Row")?.u64()?.into_no_null_iter() {
        let record = &records[row as usize];
        let Some(customer_id) = record.customer_id else {
            continue;
        };
        let line_amount = record
            .line_amount()
            .ok_or(SegmentError::AmountOverflow { customer_id })?;

        cleaned.push(ValidTransaction {
            customer_id,
            invoice_id: record.invoice_id.clone(),
            invoice_timestamp: record.invoice_timestamp,
            line_amount,
        });
    }

    debug!(
        input = records.len(),
        kept = cleaned.len(),
        dropped = records.len() - cleaned.len(),
        "Records cleaned"
    );

    Ok(cleaned)
}

/// Columns the cleaning filter looks at, plus the index of the source record
fn records_frame(records: &[TransactionRecord]) -> Result<DataFrame> {
    let row: Vec<u64> = (0..records.len() as u64).collect();
    let customer: Vec<Option<i64>> = records.iter().map(|r| r.customer_id).collect();
    let quantity: Vec<i64> = records.iter().map(|r| r.quantity).collect();
    // Only the sign is compared, and it survives the f64 conversion
    let unit_price: Vec<f64> = records
        .iter()
        .map(|r| r.unit_price.to_f64().unwrap_or(f64::NAN))
        .collect();

    Ok(DataFrame::new(vec![
        Series::new("Row", row),
        Series::new("CustomerID", customer),
        Series::new("Quantity", quantity),
        Series::new("UnitPrice", unit_price),
    ])?)
}

/// Reduce cleaned transactions to one profile per customer, ordered by customer id.
///
/// Monetary sums run on integer minor units at the batch's largest decimal
/// scale, so the result depends only on the multiset of inputs.
pub fn compute_rfm_profiles(transactions: &[ValidTransaction]) -> Result<Vec<CustomerRfmProfile>> {
    if transactions.is_empty() {
        return Ok(Vec::new());
    }

    let scale = transactions
        .iter()
        .map(|tx| tx.line_amount.scale())
        .max()
        .unwrap_or(0);

    // Every amount is positive, so a batch total that fits bounds every group sum
    let mut amounts = Vec::with_capacity(transactions.len());
    let mut batch_total: i64 = 0;
    for tx in transactions {
        let overflow = || SegmentError::AmountOverflow {
            customer_id: tx.customer_id,
        };
        let units = minor_units(tx.line_amount, scale).ok_or_else(overflow)?;
        batch_total = batch_total.checked_add(units).ok_or_else(overflow)?;
        amounts.push(units);
    }

    let frame = DataFrame::new(vec![
        Series::new(
            "CustomerID",
            transactions.iter().map(|tx| tx.customer_id).collect::<Vec<_>>(),
        ),
        Series::new(
            "InvoiceNo",
            transactions
                .iter()
                .map(|tx| tx.invoice_id.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            "InvoiceDate",
            transactions
                .iter()
                .map(|tx| tx.invoice_timestamp.map(|ts| ts.and_utc().timestamp_micros()))
                .collect::<Vec<_>>(),
        ),
        Series::new("Amount", amounts),
    ])?;

    let snapshot = snapshot_date(&frame)?;

    let rfm = frame
        .lazy()
        .group_by([col("CustomerID")])
        .agg([
            col("InvoiceDate").max().alias("LastPurchase"),
            col("InvoiceNo").n_unique().alias("Frequency"),
            col("Amount").sum().alias("Monetary"),
        ])
        .collect()?;

    let customers = rfm.column("CustomerID")?.i64()?;
    let last_purchase = rfm.column("LastPurchase")?.i64()?;
    let frequency = rfm.column("Frequency")?.cast(&DataType::UInt64)?;
    let frequency = frequency.u64()?;
    let monetary = rfm.column("Monetary")?.i64()?;

    let mut profiles = Vec::with_capacity(rfm.height());
    for idx in 0..rfm.height() {
        let Some(customer_id) = customers.get(idx) else {
            continue;
        };
        let last = last_purchase
            .get(idx)
            .and_then(from_micros)
            .ok_or(SegmentError::MissingPurchaseDate { customer_id })?;
        let snapshot = snapshot.ok_or(SegmentError::MissingPurchaseDate { customer_id })?;

        profiles.push(CustomerRfmProfile {
            customer_id,
            recency: (snapshot - last).num_days(),
            frequency: frequency.get(idx).unwrap_or(0),
            monetary: Decimal::new(monetary.get(idx).unwrap_or(0), scale),
        });
    }
    profiles.sort_by_key(|profile| profile.customer_id);

    debug!(
        customers = profiles.len(),
        snapshot = ?snapshot,
        "RFM profiles computed"
    );

    Ok(profiles)
}

/// Latest dated transaction in the batch plus one day; `None` when nothing is dated.
fn snapshot_date(frame: &DataFrame) -> Result<Option<NaiveDateTime>> {
    let latest = frame.column("InvoiceDate")?.i64()?.max();
    Ok(latest
        .and_then(from_micros)
        .map(|latest| latest + Duration::days(1)))
}

fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// `amount` as an integer count of `10^-scale` units
fn minor_units(amount: Decimal, scale: u32) -> Option<i64> {
    let mut rescaled = amount;
    rescaled.rescale(scale);
    if rescaled.scale() != scale {
        return None;
    }
    i64::try_from(rescaled.mantissa()).ok()
}
