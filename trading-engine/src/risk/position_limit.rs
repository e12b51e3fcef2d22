use std::collections::HashMap;

use super::{OrderMap, RiskContext, RiskRule};
use crate::errors::ErrorCode;
use crate::models::{closing_leg, Order, TradeEvent, TradeType};
use trader_protocol::{Direction, OrderOffset};

/// Offset feasibility and position bookkeeping. A close may not claim more
/// than the closable holdings of its leg; the closing volume is frozen on
/// send and released as the order fills, cancels or dies. Fills of any kind
/// flow into the portfolio here.
pub struct PositionRule {
    reservations: HashMap<u64, FrozenClose>,
}

struct FrozenClose {
    ticker_index: u32,
    leg: Direction,
    remaining: i32,
}

impl PositionRule {
    pub fn new() -> Self {
        Self {
            reservations: HashMap::new(),
        }
    }
}

impl Default for PositionRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRule for PositionRule {
    fn name(&self) -> &'static str {
        "Position"
    }

    fn check_order_req(&mut self, order: &Order, _orders: &OrderMap, ctx: &RiskContext) -> ErrorCode {
        let req = &order.req;
        if !req.offset.is_close() {
            return ErrorCode::NoError;
        }
        let leg = closing_leg(req.direction);
        let closable = ctx.portfolio.closable(req.contract.index, leg, req.offset);
        if req.volume > closable {
            return ErrorCode::PositionNotEnough;
        }
        ErrorCode::NoError
    }

    fn on_order_sent(&mut self, order: &Order, ctx: &mut RiskContext) {
        let req = &order.req;
        if !req.offset.is_close() {
            return;
        }
        let leg = closing_leg(req.direction);
        ctx.portfolio.freeze(req.contract.index, leg, req.volume);
        self.reservations.insert(
            req.engine_order_id,
            FrozenClose {
                ticker_index: req.contract.index,
                leg,
                remaining: req.volume,
            },
        );
    }

    fn on_order_traded(&mut self, order: &Order, trade: &TradeEvent, ctx: &mut RiskContext) {
        match trade.trade_type {
            TradeType::SecondaryMarket => {
                ctx.portfolio.apply_trade(
                    trade.ticker_index,
                    trade.direction,
                    trade.offset,
                    trade.volume,
                    trade.price,
                );
                if let Some(res) = self.reservations.get_mut(&order.req.engine_order_id) {
                    // apply_trade consumed the frozen volume already.
                    res.remaining = (res.remaining - trade.volume).max(0);
                }
            }
            TradeType::AcquiredStock | TradeType::PrimaryMarket => {
                ctx.portfolio.apply_trade(
                    trade.ticker_index,
                    Direction::Buy,
                    OrderOffset::Open,
                    trade.volume,
                    trade.price,
                );
            }
            TradeType::ReleasedStock => {
                ctx.portfolio.apply_trade(
                    trade.ticker_index,
                    Direction::Sell,
                    OrderOffset::Close,
                    trade.volume,
                    trade.price,
                );
            }
            TradeType::CashSubstitution => {}
        }
    }

    fn on_order_canceled(&mut self, order: &Order, canceled_volume: i32, ctx: &mut RiskContext) {
        if let Some(res) = self.reservations.get_mut(&order.req.engine_order_id) {
            let release = canceled_volume.min(res.remaining);
            ctx.portfolio.release(res.ticker_index, res.leg, release);
            res.remaining -= release;
        }
    }

    fn on_order_rejected(&mut self, order: &Order, _code: ErrorCode, ctx: &mut RiskContext) {
        if let Some(res) = self.reservations.remove(&order.req.engine_order_id) {
            ctx.portfolio.release(res.ticker_index, res.leg, res.remaining);
        }
    }

    fn on_order_completed(&mut self, order: &Order, ctx: &mut RiskContext) {
        if let Some(res) = self.reservations.remove(&order.req.engine_order_id) {
            ctx.portfolio.release(res.ticker_index, res.leg, res.remaining);
        }
    }
}
