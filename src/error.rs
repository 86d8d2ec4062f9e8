use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum CompanionError {
    // Connection errors
    ConnectionError(String),
    ConnectionClosed,

    // Wire errors
    EncodeError(String),
    DecodeError(String),

    // Request errors
    ResponseTimeout,
    ServerError(String),

    // Admission control errors
    RateLimited(String),

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for CompanionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::EncodeError(msg) => write!(f, "Frame encode error: {}", msg),
            Self::DecodeError(msg) => write!(f, "Frame decode error: {}", msg),
            Self::ResponseTimeout => write!(f, "Timed out waiting for a response"),
            Self::ServerError(msg) => write!(f, "Server reported an error: {}", msg),
            Self::RateLimited(msg) => write!(f, "Rate limited: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for CompanionError {}

// Generic result type for companion-link
pub type Result<T> = std::result::Result<T, CompanionError>;
