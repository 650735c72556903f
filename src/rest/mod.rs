//! REST collaborator APIs

pub mod client;
pub mod market;

pub use client::RestClient;
pub use market::{
    BookLevel, Candle, MarketApi, MarketDataSource, MarketListing, OrderBookSnapshot, TapeTrade,
};
