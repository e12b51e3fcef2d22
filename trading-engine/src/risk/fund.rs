use std::collections::HashMap;

use super::{OrderMap, RiskContext, RiskRule};
use crate::errors::ErrorCode;
use crate::models::{Contract, Order, TradeEvent};
use trader_protocol::{Direction, OrderOffset};

/// Cash sufficiency. Freezes the margin estimate when an opening order is
/// sent, converts frozen into margin as it fills, and releases whatever is
/// left when the order dies. Closing orders need no cash.
pub struct FundRule {
    reservations: HashMap<u64, Reservation>,
}

struct Reservation {
    per_unit: f64,
    remaining: f64,
}

fn margin_rate(contract: &Contract, direction: Direction) -> f64 {
    let rate = match direction {
        Direction::Buy => contract.long_margin_rate,
        Direction::Sell => contract.short_margin_rate,
    };
    if rate > 0.0 {
        rate
    } else {
        1.0
    }
}

impl FundRule {
    pub fn new() -> Self {
        Self {
            reservations: HashMap::new(),
        }
    }

    /// Margin estimate for one lot. Market orders fall back to the last
    /// seen price; with no price at all the estimate is zero and the check
    /// cannot reject.
    fn unit_cost(&self, order: &Order, ctx: &RiskContext) -> f64 {
        let contract = &order.req.contract;
        let price = if order.req.price > 0.0 {
            order.req.price
        } else {
            ctx.md
                .get(contract.index)
                .map(|t| t.last_price)
                .unwrap_or(0.0)
        };
        price * contract.size as f64 * margin_rate(contract, order.req.direction)
    }
}

impl Default for FundRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRule for FundRule {
    fn name(&self) -> &'static str {
        "Fund"
    }

    fn check_order_req(&mut self, order: &Order, _orders: &OrderMap, ctx: &RiskContext) -> ErrorCode {
        if order.req.offset != OrderOffset::Open {
            return ErrorCode::NoError;
        }
        let cost = self.unit_cost(order, ctx) * order.req.volume as f64;
        if cost > ctx.account.available() {
            return ErrorCode::InsufficientFunds;
        }
        ErrorCode::NoError
    }

    fn on_order_sent(&mut self, order: &Order, ctx: &mut RiskContext) {
        if order.req.offset != OrderOffset::Open {
            return;
        }
        let per_unit = self.unit_cost(order, ctx);
        let cost = per_unit * order.req.volume as f64;
        ctx.account.frozen += cost;
        self.reservations.insert(
            order.req.engine_order_id,
            Reservation {
                per_unit,
                remaining: cost,
            },
        );
    }

    fn on_order_traded(&mut self, order: &Order, trade: &TradeEvent, ctx: &mut RiskContext) {
        let contract = &order.req.contract;
        let rate = margin_rate(contract, order.req.direction);
        let notional = trade.price * trade.volume as f64 * contract.size as f64 * rate;
        if order.req.offset == OrderOffset::Open {
            if let Some(res) = self.reservations.get_mut(&order.req.engine_order_id) {
                let release = (res.per_unit * trade.volume as f64).min(res.remaining);
                res.remaining -= release;
                ctx.account.frozen = (ctx.account.frozen - release).max(0.0);
            }
            ctx.account.margin += notional;
        } else {
            ctx.account.margin = (ctx.account.margin - notional).max(0.0);
        }
    }

    fn on_order_canceled(&mut self, order: &Order, canceled_volume: i32, ctx: &mut RiskContext) {
        if let Some(res) = self.reservations.get_mut(&order.req.engine_order_id) {
            let release = (res.per_unit * canceled_volume as f64).min(res.remaining);
            res.remaining -= release;
            ctx.account.frozen = (ctx.account.frozen - release).max(0.0);
        }
    }

    fn on_order_rejected(&mut self, order: &Order, _code: ErrorCode, ctx: &mut RiskContext) {
        if let Some(res) = self.reservations.remove(&order.req.engine_order_id) {
            ctx.account.frozen = (ctx.account.frozen - res.remaining).max(0.0);
        }
    }

    fn on_order_completed(&mut self, order: &Order, ctx: &mut RiskContext) {
        // Residual only covers estimate drift; normally zero by now.
        if let Some(res) = self.reservations.remove(&order.req.engine_order_id) {
            ctx.account.frozen = (ctx.account.frozen - res.remaining).max(0.0);
        }
    }
}
