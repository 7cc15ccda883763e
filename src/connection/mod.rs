//! Live-channel layer: wire frames, reconnection policy, and the
//! connection lifecycle manager.
//!
//! The manager owns the one channel per participant session; everything
//! downstream consumes the typed [`ClientEvent`] stream.

pub mod frames;
mod manager;
mod reconnect;

pub use frames::{
    AttributeUpdate, BookSnapshot, ClientFrame, MarketStarted, OrderStatusUpdate, PriceLevel,
    ServerEvent, Side, TransactionBatch, TransactionWire, WireOrderStatus,
};
pub use manager::{
    ChannelState, ClientEvent, ConnectionError, ConnectionManager, CredentialSource,
    StaticCredentials, NO_AUTH_SENTINEL,
};
pub use reconnect::{
    close_disposition, reconnect_with_backoff, CloseDisposition, ReconnectConfig, CLOSE_NORMAL,
    REASON_SESSION_WAITING,
};
