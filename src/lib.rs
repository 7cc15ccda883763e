//! Real-time trading session client
//!
//! Client-side engine for a multi-participant trading study:
//! - Live channel with auth handshake and reconnection
//! - Anchored order book display aggregation
//! - Optimistic order lifecycle tracking with server reconciliation
//! - Session state machine, navigation guard, and persistence

pub mod api;
pub mod book;
pub mod config;
pub mod connection;
pub mod error;
pub mod orders;
pub mod runtime;
pub mod session;
pub mod trader;

pub use error::{AppError, Result};
pub use runtime::{ClientRuntime, RuntimeHandle};
