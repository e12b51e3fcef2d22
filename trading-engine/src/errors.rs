use std::fmt;

use thiserror::Error;
use trader_protocol::RingError;

/// Stable integer codes surfaced back to strategies on the response channel.
/// The numeric values are part of the wire contract; append only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    NoError = 0,
    /// Gateway declined the push before it reached the broker.
    SendFailed = 1,
    /// Broker rejected after accepting the push.
    Rejected = 2,
    InvalidContract = 3,
    InvalidVolume = 4,
    InvalidPrice = 5,
    PriceOutOfBand = 6,
    InsufficientFunds = 7,
    PositionNotEnough = 8,
    Throttled = 9,
    SelfTrade = 10,
}

impl ErrorCode {
    pub fn is_ok(self) -> bool {
        self == ErrorCode::NoError
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NoError => "no error",
            ErrorCode::SendFailed => "send failed",
            ErrorCode::Rejected => "rejected by broker",
            ErrorCode::InvalidContract => "invalid contract",
            ErrorCode::InvalidVolume => "invalid volume",
            ErrorCode::InvalidPrice => "invalid price",
            ErrorCode::PriceOutOfBand => "price out of band",
            ErrorCode::InsufficientFunds => "insufficient funds",
            ErrorCode::PositionNotEnough => "position not enough",
            ErrorCode::Throttled => "throttled",
            ErrorCode::SelfTrade => "self trade",
        };
        write!(f, "{s}")
    }
}

/// Fatal failures. Anything here aborts login or the dispatch loop; nothing
/// crosses the engine boundary as a panic.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown gateway api '{0}'")]
    UnknownGateway(String),

    #[error("gateway login failed")]
    LoginFailed,

    #[error("gateway startup query failed: {0}")]
    StartupQueryFailed(&'static str),

    #[error("unknown risk rule '{0}'")]
    UnknownRiskRule(String),

    #[error("risk rule '{rule}' failed to initialize: {reason}")]
    RiskInitFailed { rule: &'static str, reason: String },

    #[error("command ring error: {0}")]
    Ring(#[from] RingError),

    #[error("command bus error: {0}")]
    Bus(#[from] zmq::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
