//! Wire frames for the market-data feed

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::{FeedError, FeedResult};
use super::types::{PriceUpdate, Symbol};

/// Outbound subscribe request. The feed accepts batch subscriptions, so
/// reconnect replay sends every live symbol in a single frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub subscriptions: Vec<SubscriptionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub name: String,
    pub symbols: Vec<String>,
}

impl SubscribeFrame {
    pub fn batch(channel: &str, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            frame_type: "subscribe".to_string(),
            subscriptions: vec![SubscriptionEntry {
                name: channel.to_string(),
                symbols: symbols.into_iter().map(|s| s.0).collect(),
            }],
        }
    }

    pub fn single(channel: &str, symbol: &Symbol) -> Self {
        Self::batch(channel, [symbol.clone()])
    }

    pub fn to_text(&self) -> FeedResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Raw inbound frame. Unknown `type` values (heartbeats, acks) are kept
/// around only long enough to be ignored.
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    symbol: Option<String>,
    price: Option<serde_json::Value>,
    change: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum InboundFrame {
    Update(PriceUpdate),
    Ignored,
}

/// Parses one inbound text frame. Price and change arrive as JSON
/// strings or numbers depending on the feed; both are accepted.
pub fn parse_frame(text: &str) -> FeedResult<InboundFrame> {
    let raw: RawFrame = serde_json::from_str(text)?;
    if raw.frame_type != "update" {
        return Ok(InboundFrame::Ignored);
    }

    let symbol = raw
        .symbol
        .ok_or_else(|| FeedError::Parse("update frame missing symbol".to_string()))?;
    let price = raw
        .price
        .as_ref()
        .and_then(value_to_f64)
        .ok_or_else(|| FeedError::Parse(format!("update frame for {} missing price", symbol)))?;
    let change = raw.change.as_ref().and_then(value_to_f64);

    Ok(InboundFrame::Update(PriceUpdate {
        symbol: Symbol::new(symbol),
        price,
        change,
        received_at: Utc::now(),
    }))
}

fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
