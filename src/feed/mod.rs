//! Live market-data connector: connection manager, subscription
//! registry, wire protocol, and reconnect policy.

pub mod config;
pub mod connector;
pub mod errors;
pub mod protocol;
pub mod reconnect;
pub mod registry;
pub mod types;

pub use config::FeedConfig;
pub use connector::MarketDataConnector;
pub use errors::{ErrorKind, FeedError, FeedResult};
pub use protocol::{InboundFrame, SubscribeFrame, SubscriptionEntry};
pub use reconnect::ReconnectPolicy;
pub use registry::{SubscriptionId, SubscriptionRegistry, UpdateCallback};
pub use types::{ConnectionStatus, PriceUpdate, Symbol};
