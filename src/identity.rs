//! Server identity used to key all per-connection state

use std::fmt;

/// Immutable description of one upstream game server pairing.
///
/// Equality and hashing are by field value: two identical identities must
/// resolve to the same rate-limiter buckets and handler registrations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerIdentity {
    pub host: String,
    pub port: Option<u16>,
    /// Numeric account id sent with every request for authentication.
    pub account_id: u64,
    /// Account secret paired with the id.
    pub account_token: i64,
    /// Whether to connect over a TLS-upgraded stream (`wss://`).
    pub secure: bool,
}

impl ServerIdentity {
    pub fn new(
        host: impl Into<String>,
        port: Option<u16>,
        account_id: u64,
        account_token: i64,
        secure: bool,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            account_id,
            account_token,
            secure,
        }
    }

    /// The `host[:port]` part of the connection URL.
    pub fn server_address(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (account {})", self.server_address(), self.account_id)
    }
}
