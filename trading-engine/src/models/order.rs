use std::sync::Arc;

pub use trader_protocol::{Direction, OrderOffset, OrderType, StrategyId};

use super::contract::Contract;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Pushed to the gateway, no broker word yet.
    Submitting,
    Accepted,
    Canceling,
    Done,
}

/// What the engine hands to the gateway. Immutable once built.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// Engine-assigned, unique for the process lifetime, assigned before any
    /// broker interaction.
    pub engine_order_id: u64,
    pub contract: Arc<Contract>,
    pub order_type: OrderType,
    pub direction: Direction,
    pub offset: OrderOffset,
    pub volume: i32,
    /// Ignored for market-style orders.
    pub price: f64,
    /// Opaque gateway flags.
    pub flags: u32,
}

/// Registry entry: the authoritative per-order state, reconciled against
/// gateway callbacks that can arrive in any order.
#[derive(Debug, Clone)]
pub struct Order {
    pub req: OrderRequest,
    /// Strategy-scoped id echoed back on responses.
    pub user_order_id: u32,
    pub strategy_id: StrategyId,
    /// Broker-assigned id, 0 until first acceptance.
    pub order_id: u64,
    pub status: OrderStatus,
    /// Latched true on first broker ack or first trade, never cleared.
    pub accepted: bool,
    pub traded_volume: i32,
    pub canceled_volume: i32,
}

impl Order {
    pub fn new(req: OrderRequest, user_order_id: u32, strategy_id: StrategyId) -> Self {
        Self {
            req,
            user_order_id,
            strategy_id,
            order_id: 0,
            status: OrderStatus::Submitting,
            accepted: false,
            traded_volume: 0,
            canceled_volume: 0,
        }
    }

    /// The single authoritative terminal test.
    pub fn is_terminal(&self) -> bool {
        self.traded_volume + self.canceled_volume == self.req.volume
    }

    pub fn remaining(&self) -> i32 {
        self.req.volume - self.traded_volume - self.canceled_volume
    }
}
