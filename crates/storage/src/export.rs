//! CSV export of stored history.

use arbitrage_core::{OpportunityRecord, Quote};
use chrono::{DateTime, SecondsFormat, Utc};
use csv::Writer;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Export is not valid UTF-8")]
    Encoding,
}

pub const OPPORTUNITY_HEADER: [&str; 11] = [
    "timestamp",
    "exchange_from",
    "exchange_to",
    "buy_price",
    "sell_price",
    "gross_difference",
    "gross_percentage",
    "net_profit",
    "net_profit_percentage",
    "total_fees",
    "is_profitable",
];

pub const PRICE_HEADER: [&str; 5] = ["timestamp", "exchange", "last", "bid", "ask"];

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write opportunity records, header first.
pub fn write_opportunities_csv<W: io::Write>(
    writer: W,
    records: &[OpportunityRecord],
) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(OPPORTUNITY_HEADER)?;

    for r in records {
        writer.write_record(&[
            timestamp(&r.timestamp),
            r.exchange_from.clone(),
            r.exchange_to.clone(),
            r.buy_price.to_string(),
            r.sell_price.to_string(),
            r.gross_difference.to_string(),
            r.gross_percentage.to_string(),
            r.net_profit.to_string(),
            r.net_profit_percentage.to_string(),
            r.total_fees.to_string(),
            r.is_profitable.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write quotes, header first. Absent sides are empty cells.
pub fn write_prices_csv<W: io::Write>(writer: W, quotes: &[Quote]) -> Result<(), ExportError> {
    let mut writer = Writer::from_writer(writer);
    writer.write_record(PRICE_HEADER)?;

    for q in quotes {
        writer.write_record(&[
            timestamp(&q.observed_at),
            q.exchange.to_string(),
            optional(q.last),
            optional(q.bid),
            optional(q.ask),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Render opportunity records as a CSV document.
pub fn opportunities_to_csv(records: &[OpportunityRecord]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_opportunities_csv(&mut buf, records)?;
    String::from_utf8(buf).map_err(|_| ExportError::Encoding)
}

/// Render quotes as a CSV document.
pub fn prices_to_csv(quotes: &[Quote]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_prices_csv(&mut buf, quotes)?;
    String::from_utf8(buf).map_err(|_| ExportError::Encoding)
}
