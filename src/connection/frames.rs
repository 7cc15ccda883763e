//! Wire frame types for the trader channel
//!
//! Inbound frames arrive as JSON `{type, data}` (some server versions
//! flatten the payload next to `type`); outbound action frames are always
//! `{type, data}`. All side normalization happens here; downstream code
//! only ever sees the [`Side`] enum, never the wire's mixed
//! string/integer encodings.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Side
// ============================================================================

/// Order side, normalized once at the wire boundary.
///
/// The platform historically encoded sides as `"bid"`/`"ask"`, `"buy"`/
/// `"sell"` (any case) or the integers `1`/`-1`. All of those decode to
/// this enum; encoding always emits the platform's native `"bid"`/`"ask"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    fn from_wire_str(s: &str) -> Option<Side> {
        match s.to_ascii_lowercase().as_str() {
            "bid" | "buy" | "1" => Some(Side::Buy),
            "ask" | "sell" | "-1" => Some(Side::Sell),
            _ => None,
        }
    }

    fn from_wire_int(i: i64) -> Option<Side> {
        match i {
            1 => Some(Side::Buy),
            -1 => Some(Side::Sell),
            _ => None,
        }
    }
}

impl Serialize for Side {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            Side::Buy => "bid",
            Side::Sell => "ask",
        })
    }
}

impl<'de> Deserialize<'de> for Side {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let side = match &value {
            Value::String(s) => Side::from_wire_str(s),
            Value::Number(n) => n.as_i64().and_then(Side::from_wire_int),
            _ => None,
        };
        side.ok_or_else(|| de::Error::custom(format!("unrecognized order side: {}", value)))
    }
}

// ============================================================================
// Book levels
// ============================================================================

/// A single price level. Ephemeral: levels are replaced wholesale on every
/// book update and never mutated in place.
///
/// The wire has two shapes for levels, `{price, quantity}` and the chart
/// form `{x, y}`; both decode here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

impl PriceLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

impl<'de> Deserialize<'de> for PriceLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireLevel {
            Named { price: f64, quantity: f64 },
            Chart { x: f64, y: f64 },
        }

        Ok(match WireLevel::deserialize(deserializer)? {
            WireLevel::Named { price, quantity } => PriceLevel { price, quantity },
            WireLevel::Chart { x, y } => PriceLevel {
                price: x,
                quantity: y,
            },
        })
    }
}

// ============================================================================
// Inbound payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TimeUpdate {
    #[serde(default)]
    pub current_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_trading_started: bool,
    #[serde(default)]
    pub remaining_time: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookSnapshot {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

/// Per-order status change reported by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderStatusUpdate {
    pub order_id: String,
    /// Echo of the client-generated temporary id, present on acks/rejects
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub status: WireOrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOrderStatus {
    Active,
    Cancelled,
    Rejected,
}

/// One executed trade. `bid_order_id`/`ask_order_id` together form the
/// uniqueness key used for deduplication downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionWire {
    pub bid_order_id: String,
    pub ask_order_id: String,
    pub price: f64,
    pub amount: u32,
    pub initiator_side: Side,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBatch {
    #[serde(default)]
    pub transactions: Vec<TransactionWire>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TraderCount {
    #[serde(alias = "current_human_traders")]
    pub current: u32,
    #[serde(alias = "expected_human_traders")]
    pub expected: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketStarted {
    #[serde(default)]
    pub market_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraderIdConfirmation {
    pub trader_id: String,
}

/// Live overlay of trader attributes; every field optional because the
/// server only sends what changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributeUpdate {
    #[serde(default)]
    pub goal: Option<i64>,
    #[serde(default)]
    pub goal_progress: Option<i64>,
    #[serde(default)]
    pub shares: Option<f64>,
    #[serde(default)]
    pub cash: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiAdvice {
    #[serde(default)]
    pub advisor_id: Option<String>,
    /// Advice body is consumed opaquely by the view layer
    #[serde(default)]
    pub advice: Value,
}

// ============================================================================
// ServerEvent
// ============================================================================

/// A decoded inbound frame. Unknown types decode to `None` (logged and
/// dropped by the caller), never to an error.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Time(TimeUpdate),
    Book(BookSnapshot),
    OrderStatus(OrderStatusUpdate),
    Transactions(TransactionBatch),
    TraderCount(TraderCount),
    MarketStatus(String),
    TraderStatus(String),
    TraderIdConfirmed(TraderIdConfirmation),
    MarketStarted(MarketStarted),
    MarketEnded,
    Attributes(AttributeUpdate),
    Advice(AiAdvice),
}

impl ServerEvent {
    /// Decode a raw text frame.
    ///
    /// Returns `Ok(None)` for recognized-but-irrelevant or unknown types;
    /// `Err` only when the payload is not valid JSON or a known type
    /// carries an undecodable body.
    pub fn decode(raw: &str) -> Result<Option<ServerEvent>, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;

        let frame_type = match value.get("type").and_then(Value::as_str) {
            Some(t) => t.to_string(),
            None => {
                tracing::debug!("frame without type field dropped");
                return Ok(None);
            }
        };

        // Older server versions flatten the payload next to `type`.
        let data = value.get("data").cloned().unwrap_or(value);

        let event = match frame_type.as_str() {
            "time_update" => Some(ServerEvent::Time(serde_json::from_value(data)?)),
            "order_book_update" | "book_updated" | "BOOK_UPDATED" => {
                Some(ServerEvent::Book(serde_json::from_value(data)?))
            }
            "order_status_update" => Some(ServerEvent::OrderStatus(serde_json::from_value(data)?)),
            "transaction_update" => Some(ServerEvent::Transactions(serde_json::from_value(data)?)),
            "trader_count_update" | "traders_count" => {
                Some(ServerEvent::TraderCount(serde_json::from_value(data)?))
            }
            "market_status_update" => Some(ServerEvent::MarketStatus(
                data.get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )),
            "trader_status_update" => Some(ServerEvent::TraderStatus(
                data.get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            )),
            "trader_id_confirmation" => {
                Some(ServerEvent::TraderIdConfirmed(serde_json::from_value(data)?))
            }
            "market_started" => Some(ServerEvent::MarketStarted(serde_json::from_value(data)?)),
            "closure" | "stop_trading" | "trading_ended" => Some(ServerEvent::MarketEnded),
            "trader_update" => Some(ServerEvent::Attributes(serde_json::from_value(data)?)),
            "AI_ADVICE" => Some(ServerEvent::Advice(serde_json::from_value(data)?)),
            other => {
                tracing::debug!(frame_type = other, "unknown frame type dropped");
                None
            }
        };

        Ok(event)
    }
}

// ============================================================================
// Outbound frames
// ============================================================================

/// Client → server action frames, serialized as `{type, data}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    AddOrder {
        side: Side,
        price: f64,
        amount: u32,
    },
    CancelOrder {
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_decodes_every_wire_encoding() {
        for raw in ["\"bid\"", "\"buy\"", "\"BUY\"", "1"] {
            let side: Side = serde_json::from_str(raw).unwrap();
            assert_eq!(side, Side::Buy, "raw: {}", raw);
        }
        for raw in ["\"ask\"", "\"sell\"", "\"SELL\"", "-1"] {
            let side: Side = serde_json::from_str(raw).unwrap();
            assert_eq!(side, Side::Sell, "raw: {}", raw);
        }
    }

    #[test]
    fn test_side_rejects_garbage() {
        assert!(serde_json::from_str::<Side>("\"mid\"").is_err());
        assert!(serde_json::from_str::<Side>("0").is_err());
    }

    #[test]
    fn test_side_serializes_to_platform_vocabulary() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"bid\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"ask\"");
    }

    #[test]
    fn test_price_level_decodes_both_shapes() {
        let named: PriceLevel = serde_json::from_str(r#"{"price": 101.0, "quantity": 3.0}"#).unwrap();
        let chart: PriceLevel = serde_json::from_str(r#"{"x": 101.0, "y": 3.0}"#).unwrap();
        assert_eq!(named, chart);
    }

    #[test]
    fn test_decode_book_update_nested_data() {
        let raw = r#"{"type": "order_book_update", "data": {"bids": [{"x": 100, "y": 2}], "asks": [{"price": 102, "quantity": 1}]}}"#;
        match ServerEvent::decode(raw).unwrap() {
            Some(ServerEvent::Book(book)) => {
                assert_eq!(book.bids[0].price, 100.0);
                assert_eq!(book.asks[0].quantity, 1.0);
            }
            other => panic!("expected Book, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_flattened_payload() {
        // Older servers put fields next to `type` with no `data` wrapper
        let raw = r#"{"type": "trader_count_update", "current_human_traders": 2, "expected_human_traders": 3}"#;
        match ServerEvent::decode(raw).unwrap() {
            Some(ServerEvent::TraderCount(count)) => {
                assert_eq!(count.current, 2);
                assert_eq!(count.expected, 3);
            }
            other => panic!("expected TraderCount, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_transaction_batch() {
        let raw = r#"{"type": "transaction_update", "data": {"transactions": [
            {"bid_order_id": "X", "ask_order_id": "Y", "price": 101.0, "amount": 1, "initiator_side": "ask"}
        ]}}"#;
        match ServerEvent::decode(raw).unwrap() {
            Some(ServerEvent::Transactions(batch)) => {
                assert_eq!(batch.transactions.len(), 1);
                assert_eq!(batch.transactions[0].initiator_side, Side::Sell);
            }
            other => panic!("expected Transactions, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_unknown_type_is_none_not_error() {
        let raw = r#"{"type": "some_future_frame", "data": {"whatever": 1}}"#;
        assert!(ServerEvent::decode(raw).unwrap().is_none());
    }

    #[test]
    fn test_decode_malformed_json_is_error() {
        assert!(ServerEvent::decode("{not json").is_err());
    }

    #[test]
    fn test_closure_variants_map_to_market_ended() {
        for t in ["closure", "stop_trading", "trading_ended"] {
            let raw = format!(r#"{{"type": "{}"}}"#, t);
            assert!(matches!(
                ServerEvent::decode(&raw).unwrap(),
                Some(ServerEvent::MarketEnded)
            ));
        }
    }

    #[test]
    fn test_client_frame_wire_shape() {
        let frame = ClientFrame::AddOrder {
            side: Side::Buy,
            price: 101.0,
            amount: 1,
        };
        let json: Value = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "add_order");
        assert_eq!(json["data"]["side"], "bid");
        assert_eq!(json["data"]["price"], 101.0);

        let cancel = ClientFrame::CancelOrder { id: "X".into() };
        let json: Value = serde_json::to_value(&cancel).unwrap();
        assert_eq!(json["type"], "cancel_order");
        assert_eq!(json["data"]["id"], "X");
    }
}
