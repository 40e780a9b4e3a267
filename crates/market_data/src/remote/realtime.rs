use chrono::Utc;
use serde_json::{Value, json};

use common::models::{OrderbookSnapshot, Tick};

/// Realtime tr codes: trade executions and quote (orderbook) updates.
pub const TR_PRICE: &str = "H0STCNT0";
pub const TR_ORDERBOOK: &str = "H0STASP0";

// Caret-separated payload field positions, per the realtime wire layout.
const PRICE_FIELD_SYMBOL: usize = 0;
const PRICE_FIELD_LAST: usize = 2;
const PRICE_FIELD_VOLUME: usize = 12;
const BOOK_FIELD_SYMBOL: usize = 0;
const BOOK_FIELD_TOTAL_ASK: usize = 43;
const BOOK_FIELD_TOTAL_BID: usize = 44;

#[derive(Debug)]
pub enum RealtimeFrame {
    Tick { symbol: String, tick: Tick },
    Orderbook { symbol: String, book: OrderbookSnapshot },
    PingPong,
    Control(String),
}

/// Builds the JSON registration (tr_type "1") or deregistration ("2")
/// request for one symbol/channel pair.
pub fn subscription_request(approval_key: &str, tr_id: &str, symbol: &str, register: bool) -> String {
    json!({
        "header": {
            "approval_key": approval_key,
            "custtype": "P",
            "tr_type": if register { "1" } else { "2" },
            "content-type": "utf-8",
        },
        "body": {
            "input": { "tr_id": tr_id, "tr_key": symbol }
        }
    })
    .to_string()
}

pub fn pong_frame() -> String {
    json!({
        "header": {
            "tr_id": "PINGPONG",
            "datetime": Utc::now().format("%Y%m%d%H%M%S").to_string(),
        }
    })
    .to_string()
}

/// Parses one websocket text frame. Data frames are pipe-delimited
/// (`flag|tr_id|count|payload`) with caret-separated payload fields;
/// everything else is a JSON control message.
pub fn parse_frame(raw: &str) -> Option<RealtimeFrame> {
    if raw.starts_with('0') || raw.starts_with('1') {
        return parse_data_frame(raw);
    }
    let value: Value = serde_json::from_str(raw).ok()?;
    let tr_id = value
        .get("header")
        .and_then(|h| h.get("tr_id"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if tr_id == "PINGPONG" {
        return Some(RealtimeFrame::PingPong);
    }
    Some(RealtimeFrame::Control(raw.to_string()))
}

fn parse_data_frame(raw: &str) -> Option<RealtimeFrame> {
    let mut parts = raw.splitn(4, '|');
    let _encrypted = parts.next()?;
    let tr_id = parts.next()?;
    let _count = parts.next()?;
    let payload = parts.next()?;
    let fields: Vec<&str> = payload.split('^').collect();

    match tr_id {
        TR_PRICE => {
            let symbol = fields.get(PRICE_FIELD_SYMBOL)?.to_string();
            let price: f64 = fields.get(PRICE_FIELD_LAST)?.parse().ok()?;
            let volume: i64 = fields
                .get(PRICE_FIELD_VOLUME)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            Some(RealtimeFrame::Tick {
                symbol,
                tick: Tick::new(price, volume, Utc::now()),
            })
        }
        TR_ORDERBOOK => {
            let symbol = fields.get(BOOK_FIELD_SYMBOL)?.to_string();
            let ask: i64 = fields
                .get(BOOK_FIELD_TOTAL_ASK)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let bid: i64 = fields
                .get(BOOK_FIELD_TOTAL_BID)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            Some(RealtimeFrame::Orderbook {
                symbol,
                book: OrderbookSnapshot::new(bid, ask, Utc::now()),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_price_frame() {
        let mut fields = vec!["0"; 20];
        fields[PRICE_FIELD_SYMBOL] = "005930";
        fields[PRICE_FIELD_LAST] = "71500";
        fields[PRICE_FIELD_VOLUME] = "1200";
        let raw = format!("0|{TR_PRICE}|001|{}", fields.join("^"));

        match parse_frame(&raw) {
            Some(RealtimeFrame::Tick { symbol, tick }) => {
                assert_eq!(symbol, "005930");
                assert_eq!(tick.price, 71500.0);
                assert_eq!(tick.volume, 1200);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn parses_orderbook_frame() {
        let mut fields = vec!["0"; 50];
        fields[BOOK_FIELD_SYMBOL] = "005930";
        fields[BOOK_FIELD_TOTAL_ASK] = "800";
        fields[BOOK_FIELD_TOTAL_BID] = "1200";
        let raw = format!("0|{TR_ORDERBOOK}|001|{}", fields.join("^"));

        match parse_frame(&raw) {
            Some(RealtimeFrame::Orderbook { symbol, book }) => {
                assert_eq!(symbol, "005930");
                assert_eq!(book.bid_volume_total, 1200);
                assert_eq!(book.ask_volume_total, 800);
                assert!((book.ratio - 1.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn recognises_pingpong() {
        let raw = r#"{"header":{"tr_id":"PINGPONG","datetime":"20260806090000"}}"#;
        assert!(matches!(parse_frame(raw), Some(RealtimeFrame::PingPong)));
    }
}
