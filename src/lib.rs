//! companion-link - a client-side RPC runtime for game-server companion
//! connections
//!
//! One persistent WebSocket carries a binary request/response protocol
//! interleaved with unsolicited broadcast events. This library provides the
//! transport: connection lifecycle, sequence-number correlation, broadcast
//! classification and dispatch, and dual-bucket rate limiting, plus a typed
//! request facade on top.

pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod identity;
pub mod models;
pub mod proxy;

// Re-export main components
pub use client::{CompanionClient, RequestError};
pub use config::{ClientConfig, ProxyConfig};
pub use core::{
    ChatEvent, CommandContext, CommandOptions, ConnectionState, EntityEvent, HandlerRegistry,
    RateLimiter, TeamEvent, Transport,
};
pub use error::{CompanionError, Result};
pub use identity::ServerIdentity;
