//! Callback payloads carried from the gateway driver into the engine.

use trader_protocol::{Direction, OrderOffset};

/// How a fill came to exist. Secondary-market trades are exchange-matched
/// and accumulate toward the order's volume; the primary-market kinds are
/// subscription/creation events that move holdings without a matched fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    SecondaryMarket,
    PrimaryMarket,
    CashSubstitution,
    AcquiredStock,
    ReleasedStock,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderAccepted {
    pub engine_order_id: u64,
    /// Broker-assigned id, used for cancels from here on.
    pub order_id: u64,
}

#[derive(Debug, Clone)]
pub struct OrderRejected {
    pub engine_order_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TradeEvent {
    pub engine_order_id: u64,
    pub order_id: u64,
    pub ticker_index: u32,
    pub direction: Direction,
    pub offset: OrderOffset,
    pub trade_type: TradeType,
    pub volume: i32,
    pub price: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct OrderCanceled {
    pub engine_order_id: u64,
    pub canceled_volume: i32,
}

#[derive(Debug, Clone)]
pub struct CancelRejected {
    pub engine_order_id: u64,
    pub reason: String,
}
