//! ISS Wire Format
//!
//! ISS responses carry each table as a `{columns, data}` block: a list of
//! column names and a list of positional rows. Column positions are resolved
//! by name once per page; a column that is absent resolves to `None` and
//! never shifts other columns. Each row then decodes to a typed record or a
//! `SkipReason`.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::application::ports::{SkipReason, TradePage};
use crate::domain::trade::{Security, TradeRecord, TradeSide};

/// Timestamp format used by ISS for `SYSTIME` and query bounds.
pub const ISS_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// =============================================================================
// Envelope
// =============================================================================

/// One ISS table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssBlock {
    /// Column names.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Positional rows.
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl IssBlock {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// `trades.json` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradesResponse {
    /// Trades table; absent when the upstream has nothing for the query.
    #[serde(default)]
    pub trades: Option<IssBlock>,
}

/// `securities.json` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecuritiesResponse {
    /// Securities table.
    #[serde(default)]
    pub securities: Option<IssBlock>,
}

// =============================================================================
// Trades
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct TradeColumns {
    tradeno: Option<usize>,
    tradedate: Option<usize>,
    tradetime: Option<usize>,
    secid: Option<usize>,
    boardid: Option<usize>,
    price: Option<usize>,
    quantity: Option<usize>,
    value: Option<usize>,
    period: Option<usize>,
    tradingsession: Option<usize>,
    buysell: Option<usize>,
    systime: Option<usize>,
    ts_offset: Option<usize>,
}

impl TradeColumns {
    fn resolve(block: &IssBlock) -> Self {
        Self {
            tradeno: block.index_of("TRADENO"),
            tradedate: block.index_of("TRADEDATE"),
            tradetime: block.index_of("TRADETIME"),
            secid: block.index_of("SECID"),
            boardid: block.index_of("BOARDID"),
            price: block.index_of("PRICE"),
            quantity: block.index_of("QUANTITY"),
            value: block.index_of("VALUE"),
            period: block.index_of("PERIOD"),
            tradingsession: block.index_of("TRADINGSESSION"),
            buysell: block.index_of("BUYSELL"),
            systime: block.index_of("SYSTIME"),
            ts_offset: block.index_of("TS_OFFSET"),
        }
    }
}

/// Decode a trades table into records plus a skip count.
#[must_use]
pub fn decode_trades(block: &IssBlock) -> TradePage {
    let columns = TradeColumns::resolve(block);
    let mut page = TradePage::default();

    for row in &block.data {
        match decode_trade_row(&columns, row) {
            Ok(record) => page.records.push(record),
            Err(reason) => {
                page.skipped += 1;
                tracing::warn!(reason = %reason, row = ?row, "Skipping malformed trade row");
            }
        }
    }

    page
}

fn decode_trade_row(c: &TradeColumns, row: &[Value]) -> Result<TradeRecord, SkipReason> {
    let seq = required(row, c.tradeno, "TRADENO", as_u64)?;
    let instrument = required(row, c.secid, "SECID", as_string)?;
    let price = required(row, c.price, "PRICE", as_decimal)?;
    let quantity = required(row, c.quantity, "QUANTITY", as_i64)?;
    let time = required(row, c.tradetime, "TRADETIME", as_time)?;

    let system_time = optional(row, c.systime, "SYSTIME", as_string)?;
    let date = match optional(row, c.tradedate, "TRADEDATE", as_date)? {
        Some(date) => date,
        None => system_time
            .as_deref()
            .and_then(|s| NaiveDateTime::parse_from_str(s, ISS_DATETIME_FORMAT).ok())
            .map(|dt| dt.date())
            .ok_or(SkipReason::MissingColumn("TRADEDATE"))?,
    };

    let value = match optional(row, c.value, "VALUE", as_decimal)? {
        Some(value) => value,
        None => price
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| SkipReason::InvalidValue {
                column: "VALUE",
                value: format!("{price} * {quantity}"),
            })?,
    };
    let side = optional(row, c.buysell, "BUYSELL", as_string)?
        .map_or(TradeSide::Unknown, |code| TradeSide::from_code(&code));

    Ok(TradeRecord {
        instrument,
        seq,
        board_id: optional(row, c.boardid, "BOARDID", as_string)?.unwrap_or_default(),
        timestamp: date.and_time(time),
        price,
        quantity,
        value,
        side,
        period: optional(row, c.period, "PERIOD", as_string)?,
        trading_session: optional(row, c.tradingsession, "TRADINGSESSION", as_string)?,
        system_time,
        ts_offset: optional(row, c.ts_offset, "TS_OFFSET", as_i64)?,
    })
}

// =============================================================================
// Securities
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct SecurityColumns {
    secid: Option<usize>,
    boardid: Option<usize>,
    shortname: Option<usize>,
    secname: Option<usize>,
    prevprice: Option<usize>,
    lotsize: Option<usize>,
    facevalue: Option<usize>,
    status: Option<usize>,
    marketprice: Option<usize>,
    currencyid: Option<usize>,
}

impl SecurityColumns {
    fn resolve(block: &IssBlock) -> Self {
        Self {
            secid: block.index_of("SECID"),
            boardid: block.index_of("BOARDID"),
            shortname: block.index_of("SHORTNAME"),
            secname: block.index_of("SECNAME"),
            prevprice: block.index_of("PREVPRICE"),
            lotsize: block.index_of("LOTSIZE"),
            facevalue: block.index_of("FACEVALUE"),
            status: block.index_of("STATUS"),
            marketprice: block.index_of("MARKETPRICE"),
            currencyid: block.index_of("CURRENCYID"),
        }
    }
}

/// Decode a securities table, dropping malformed rows.
#[must_use]
pub fn decode_securities(block: &IssBlock) -> Vec<Security> {
    let columns = SecurityColumns::resolve(block);

    block
        .data
        .iter()
        .filter_map(|row| match decode_security_row(&columns, row) {
            Ok(security) => Some(security),
            Err(reason) => {
                tracing::warn!(reason = %reason, row = ?row, "Skipping malformed security row");
                None
            }
        })
        .collect()
}

fn decode_security_row(c: &SecurityColumns, row: &[Value]) -> Result<Security, SkipReason> {
    Ok(Security {
        security_id: required(row, c.secid, "SECID", as_string)?,
        board_id: optional(row, c.boardid, "BOARDID", as_string)?.unwrap_or_default(),
        short_name: optional(row, c.shortname, "SHORTNAME", as_string)?,
        security_name: optional(row, c.secname, "SECNAME", as_string)?,
        prev_price: optional(row, c.prevprice, "PREVPRICE", as_decimal)?,
        lot_size: optional(row, c.lotsize, "LOTSIZE", as_i64)?,
        face_value: optional(row, c.facevalue, "FACEVALUE", as_decimal)?,
        status: optional(row, c.status, "STATUS", as_string)?,
        market_price: optional(row, c.marketprice, "MARKETPRICE", as_decimal)?,
        currency_id: optional(row, c.currencyid, "CURRENCYID", as_string)?,
    })
}

// =============================================================================
// Cell Decoding
// =============================================================================

fn cell(row: &[Value], index: Option<usize>) -> Option<&Value> {
    index
        .and_then(|i| row.get(i))
        .filter(|v| !v.is_null())
}

fn required<T>(
    row: &[Value],
    index: Option<usize>,
    column: &'static str,
    parse: fn(&Value) -> Option<T>,
) -> Result<T, SkipReason> {
    let value = cell(row, index).ok_or(SkipReason::MissingColumn(column))?;
    parse(value).ok_or_else(|| SkipReason::InvalidValue {
        column,
        value: value.to_string(),
    })
}

fn optional<T>(
    row: &[Value],
    index: Option<usize>,
    column: &'static str,
    parse: fn(&Value) -> Option<T>,
) -> Result<Option<T>, SkipReason> {
    cell(row, index)
        .map(|value| {
            parse(value).ok_or_else(|| SkipReason::InvalidValue {
                column,
                value: value.to_string(),
            })
        })
        .transpose()
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn as_time(value: &Value) -> Option<NaiveTime> {
    value
        .as_str()
        .and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M:%S").ok())
}

fn as_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}
