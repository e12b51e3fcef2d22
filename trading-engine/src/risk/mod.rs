//! Pre- and post-trade risk: an ordered chain of rules invoked at fixed
//! hook points around the order lifecycle.

use std::collections::HashMap;

use log::warn;

use crate::config::EngineConfig;
use crate::errors::{EngineError, ErrorCode};
use crate::models::{Account, MarketDataSnapshot, Order, Portfolio, TradeEvent};

pub mod fund;
pub mod position_limit;
pub mod price_band;
pub mod sanity;
pub mod self_trade;
pub mod throttle;

pub use fund::FundRule;
pub use position_limit::PositionRule;
pub use price_band::PriceBandRule;
pub use sanity::OrderSanityRule;
pub use self_trade::SelfTradeRule;
pub use throttle::ThrottleRule;

/// Live order registry view handed to pre-trade checks. The candidate order
/// is never in the map while it is being checked.
pub type OrderMap = HashMap<u64, Order>;

/// State the rules read and, on the post-trade hooks, mutate. Borrowed from
/// the engine for the duration of one hook invocation; the engine mutex is
/// held the whole time, so hooks must not block.
pub struct RiskContext<'a> {
    pub account: &'a mut Account,
    pub portfolio: &'a mut Portfolio,
    pub md: &'a MarketDataSnapshot,
}

/// A single rule. Every hook except `check_order_req` is pure side effect;
/// rules implement the subset they care about and inherit no-ops for the
/// rest.
pub trait RiskRule: Send {
    fn name(&self) -> &'static str;

    fn init(
        &mut self,
        _config: &EngineConfig,
        _ctx: &RiskContext,
        _orders: &OrderMap,
    ) -> Result<(), String> {
        Ok(())
    }

    /// Pre-trade gate. First nonzero code in the chain wins and is the
    /// reason surfaced to the strategy.
    fn check_order_req(&mut self, _order: &Order, _orders: &OrderMap, _ctx: &RiskContext) -> ErrorCode {
        ErrorCode::NoError
    }

    /// The gateway accepted the push.
    fn on_order_sent(&mut self, _order: &Order, _ctx: &mut RiskContext) {}

    /// First broker ack (or first trade, whichever arrives first).
    fn on_order_accepted(&mut self, _order: &Order, _ctx: &mut RiskContext) {}

    fn on_order_traded(&mut self, _order: &Order, _trade: &TradeEvent, _ctx: &mut RiskContext) {}

    fn on_order_canceled(&mut self, _order: &Order, _canceled_volume: i32, _ctx: &mut RiskContext) {}

    /// Send failed, risk failed, or the broker rejected.
    fn on_order_rejected(&mut self, _order: &Order, _code: ErrorCode, _ctx: &mut RiskContext) {}

    /// Terminal transition; fires exactly once per order.
    fn on_order_completed(&mut self, _order: &Order, _ctx: &mut RiskContext) {}
}

/// Ordered rule chain. Registration order is invocation order.
pub struct RiskManager {
    rules: Vec<Box<dyn RiskRule>>,
}

impl std::fmt::Debug for RiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskManager")
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl RiskManager {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Build the chain from the `rms_rules` config list.
    pub fn from_names(names: &[String], config: &EngineConfig) -> Result<Self, EngineError> {
        let mut manager = Self::new();
        for name in names {
            let rule: Box<dyn RiskRule> = match name.as_str() {
                "sanity" => Box::new(OrderSanityRule::new()),
                "price_band" => Box::new(PriceBandRule::new(&config.risk)),
                "fund" => Box::new(FundRule::new()),
                "position" => Box::new(PositionRule::new()),
                "self_trade" => Box::new(SelfTradeRule::new()),
                "throttle" => Box::new(ThrottleRule::new(&config.risk)),
                other => return Err(EngineError::UnknownRiskRule(other.to_string())),
            };
            manager.add_rule(rule);
        }
        Ok(manager)
    }

    pub fn add_rule(&mut self, rule: Box<dyn RiskRule>) {
        self.rules.push(rule);
    }

    /// Once at login. Any rule failing aborts the login.
    pub fn init(
        &mut self,
        config: &EngineConfig,
        ctx: &RiskContext,
        orders: &OrderMap,
    ) -> Result<(), EngineError> {
        for rule in &mut self.rules {
            let name = rule.name();
            rule.init(config, ctx, orders)
                .map_err(|reason| EngineError::RiskInitFailed { rule: name, reason })?;
        }
        Ok(())
    }

    pub fn check_order_req(&mut self, order: &Order, orders: &OrderMap, ctx: &RiskContext) -> ErrorCode {
        for rule in &mut self.rules {
            let code = rule.check_order_req(order, orders, ctx);
            if !code.is_ok() {
                warn!(
                    "order {} rejected by rule {}: {}",
                    order.req.engine_order_id,
                    rule.name(),
                    code
                );
                return code;
            }
        }
        ErrorCode::NoError
    }

    pub fn on_order_sent(&mut self, order: &Order, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_sent(order, ctx);
        }
    }

    pub fn on_order_accepted(&mut self, order: &Order, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_accepted(order, ctx);
        }
    }

    pub fn on_order_traded(&mut self, order: &Order, trade: &TradeEvent, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_traded(order, trade, ctx);
        }
    }

    pub fn on_order_canceled(&mut self, order: &Order, canceled_volume: i32, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_canceled(order, canceled_volume, ctx);
        }
    }

    pub fn on_order_rejected(&mut self, order: &Order, code: ErrorCode, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_rejected(order, code, ctx);
        }
    }

    pub fn on_order_completed(&mut self, order: &Order, ctx: &mut RiskContext) {
        for rule in &mut self.rules {
            rule.on_order_completed(order, ctx);
        }
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new()
    }
}
