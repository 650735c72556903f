//! Connector configuration

use std::time::Duration;

/// Configuration for the live feed connection.
///
/// Owned by whoever composes the application and passed into
/// [`MarketDataConnector::new`](super::MarketDataConnector::new); there is
/// no module-level singleton.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint of the market-data feed.
    pub endpoint: String,
    /// Channel name placed in the `name` field of subscribe frames.
    pub channel: String,
    /// Delay before the first reconnect attempt; doubles per attempt.
    pub base_delay: Duration,
    /// Attempts allowed before the connection is declared failed.
    pub max_reconnect_attempts: u32,
    /// Capacity of the broadcast channel feeding general observers.
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://api.gemini.com/v2/marketdata".to_string(),
            channel: "l2".to_string(),
            base_delay: Duration::from_millis(1000),
            max_reconnect_attempts: 5,
            buffer_size: 1000,
        }
    }
}
