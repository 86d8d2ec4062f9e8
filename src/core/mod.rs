//! Core RPC runtime: wire model, correlation, dispatch, and admission control

pub mod commands;
pub mod events;
pub mod frame;
pub mod pending;
pub mod rate_limiter;
pub mod registry;
pub mod token_bucket;
pub mod transport;

// Re-export main components for convenience
pub use commands::{CommandContext, CommandOptions};
pub use events::{ChatEvent, EntityEvent, TeamEvent};
pub use frame::{Request, RequestBody, ResponseBody, ServerFrame};
pub use pending::{pending_call, PendingCall, PendingReply};
pub use rate_limiter::RateLimiter;
pub use registry::{HandlerRegistry, ListenerHandle};
pub use token_bucket::TokenBucket;
pub use transport::{ConnectionState, ProxyOptions, Transport};
