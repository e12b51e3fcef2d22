//! The broker boundary.
//!
//! `Gateway` is the push direction: every method must return promptly, the
//! engine mutex is held across `send_order`/`cancel_order`. `GatewayListener`
//! is the callback direction, invoked from the driver's own threads; the
//! engine implements it and serializes the calls internally. Adapters hold
//! the listener weakly so the engine→gateway→engine loop never keeps the
//! process state alive on its own.

use std::sync::{Arc, Weak};

pub mod sim;

pub use sim::VirtualGateway;

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::models::{
    Account, CancelRejected, Contract, OrderAccepted, OrderCanceled, OrderRejected, OrderRequest,
    Position, TickData, TradeEvent,
};

pub trait Gateway: Send + Sync {
    fn login(&self, config: &EngineConfig) -> bool;

    fn logout(&self);

    /// Ask for an account snapshot; answer arrives via `on_query_account`.
    fn query_account(&self) -> bool;

    fn query_positions(&self) -> bool;

    /// Replay today's trades; answers arrive via `on_query_trade`.
    fn query_trades(&self) -> bool;

    /// Push an order to the broker driver's queue. `false` means the driver
    /// refused the push — the order never existed broker-side.
    fn send_order(&self, req: &OrderRequest) -> bool;

    fn cancel_order(&self, order_id: u64) -> bool;
}

/// Callback capability set implemented by the engine. All methods must be
/// safe to call concurrently with the dispatch loop.
pub trait GatewayListener: Send + Sync {
    fn on_query_contract(&self, _contract: Contract) {}

    fn on_query_account(&self, account: Account);

    fn on_query_position(&self, position: Position);

    fn on_query_trade(&self, trade: TradeEvent);

    fn on_tick(&self, tick: TickData);

    fn on_order_accepted(&self, rsp: OrderAccepted);

    fn on_order_rejected(&self, rsp: OrderRejected);

    fn on_order_traded(&self, rsp: TradeEvent);

    fn on_order_canceled(&self, rsp: OrderCanceled);

    fn on_order_cancel_rejected(&self, rsp: CancelRejected);
}

/// Factory keyed by the `api` config string. Real broker drivers register
/// here; the built-in `virtual` variant backs simulation and tests.
pub fn create_gateway(
    api: &str,
    listener: Weak<dyn GatewayListener>,
    config: &EngineConfig,
) -> Result<Arc<dyn Gateway>, EngineError> {
    match api {
        "virtual" => Ok(Arc::new(VirtualGateway::new(listener, config))),
        other => Err(EngineError::UnknownGateway(other.to_string())),
    }
}
