//! Market data REST collaborators
//!
//! Plain request/response wrappers around the backend endpoints the
//! dashboards poll: listings, candles, order-book snapshots, and trade
//! tapes. No caching and no retry beyond the shared client layer.

use async_trait::async_trait;
use serde::Deserialize;

use super::client::RestClient;
use crate::feed::errors::FeedResult;
use crate::feed::types::Symbol;

/// One tradable market as reported by the listings endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketListing {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub price: Option<f64>,
    #[serde(rename = "change24h")]
    pub change_24h: Option<f64>,
    #[serde(rename = "volume24h")]
    pub volume_24h: Option<f64>,
}

/// OHLC candle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub amount: f64,
}

/// Order book snapshot, best levels first.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }
}

/// One print from the trade tape.
#[derive(Debug, Clone, Deserialize)]
pub struct TapeTrade {
    pub timestamp: i64,
    pub price: f64,
    pub amount: f64,
    pub side: String,
}

/// REST surface the dashboards poll when no push channel is available.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn list_markets(&self) -> FeedResult<Vec<MarketListing>>;
    async fn candles(&self, symbol: &Symbol, interval: &str) -> FeedResult<Vec<Candle>>;
    async fn order_book(&self, symbol: &Symbol) -> FeedResult<OrderBookSnapshot>;
    async fn trades(&self, symbol: &Symbol) -> FeedResult<Vec<TapeTrade>>;
}

pub struct MarketApi {
    client: RestClient,
}

impl MarketApi {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MarketDataSource for MarketApi {
    async fn list_markets(&self) -> FeedResult<Vec<MarketListing>> {
        self.client.get_json("v1/markets").await
    }

    async fn candles(&self, symbol: &Symbol, interval: &str) -> FeedResult<Vec<Candle>> {
        self.client
            .get_json(&format!("v1/candles/{}/{}", symbol, interval))
            .await
    }

    async fn order_book(&self, symbol: &Symbol) -> FeedResult<OrderBookSnapshot> {
        self.client.get_json(&format!("v1/book/{}", symbol)).await
    }

    async fn trades(&self, symbol: &Symbol) -> FeedResult<Vec<TapeTrade>> {
        self.client.get_json(&format!("v1/trades/{}", symbol)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_market_listing() {
        let json = r#"
        [
            {"symbol":"BTCUSD","base":"BTC","quote":"USD","price":64250.5,"change24h":-1.2,"volume24h":12345.6},
            {"symbol":"ETHUSD","base":"ETH","quote":"USD"}
        ]
        "#;
        let listings: Vec<MarketListing> = serde_json::from_str(json).unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].change_24h, Some(-1.2));
        assert_eq!(listings[1].price, None);
    }

    #[test]
    fn deserialize_order_book() {
        let json = r#"
        {
            "bids": [{"price": 64250.0, "amount": 0.5}, {"price": 64249.5, "amount": 1.0}],
            "asks": [{"price": 64251.0, "amount": 0.2}]
        }
        "#;
        let book: OrderBookSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(book.best_bid().unwrap().price, 64250.0);
        assert_eq!(book.best_ask().unwrap().amount, 0.2);
    }

    #[test]
    fn deserialize_candles_and_trades() {
        let candles: Vec<Candle> = serde_json::from_str(
            r#"[{"timestamp":1700000000,"open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}]"#,
        )
        .unwrap();
        assert_eq!(candles[0].close, 1.5);

        let trades: Vec<TapeTrade> = serde_json::from_str(
            r#"[{"timestamp":1700000000,"price":64250.0,"amount":0.01,"side":"buy"}]"#,
        )
        .unwrap();
        assert_eq!(trades[0].side, "buy");
    }
}
