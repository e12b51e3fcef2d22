pub mod config;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod io;
pub mod models;
pub mod risk;

pub use config::EngineConfig;
pub use engine::TradingEngine;
pub use errors::{EngineError, ErrorCode};

/// Numeric build identity, stamped on the shared-memory command ring as its
/// owner tag. Attaching to a segment created by a different build fails, so
/// two incompatible engine versions can never share a ring.
pub fn engine_version() -> u32 {
    let mut version = 0u32;
    for part in env!("CARGO_PKG_VERSION").splitn(3, '.') {
        version = version * 1000 + part.parse::<u32>().unwrap_or(0);
    }
    version
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_stable_and_nonzero() {
        assert_eq!(engine_version(), engine_version());
        assert_ne!(engine_version(), 0);
    }
}
