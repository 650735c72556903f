//! Market Data Feed Library
//!
//! Client-side plumbing for live market data: a WebSocket connection
//! manager with automatic reconnect and subscription replay, a polling
//! fallback with the same data shape, and thin REST wrappers for the
//! collaborator endpoints.

pub mod feed;
pub mod polling;
pub mod rest;

// Re-export main types for easy access
pub use feed::{
    ConnectionStatus, FeedConfig, FeedError, FeedResult, MarketDataConnector, PriceUpdate,
    SubscriptionId, Symbol,
};
pub use polling::{PollSnapshot, Poller};
pub use rest::{MarketApi, MarketDataSource, RestClient};
