use super::{OrderMap, RiskContext, RiskRule};
use crate::errors::ErrorCode;
use crate::models::Order;

/// Structural checks no order should ever fail: positive volume, and for
/// price-carrying types a finite positive price aligned to the contract's
/// tick.
pub struct OrderSanityRule;

impl OrderSanityRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrderSanityRule {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskRule for OrderSanityRule {
    fn name(&self) -> &'static str {
        "OrderSanity"
    }

    fn check_order_req(&mut self, order: &Order, _orders: &OrderMap, _ctx: &RiskContext) -> ErrorCode {
        if order.req.volume <= 0 {
            return ErrorCode::InvalidVolume;
        }
        if order.req.order_type.carries_price() {
            let price = order.req.price;
            if !price.is_finite() || price <= 0.0 {
                return ErrorCode::InvalidPrice;
            }
            let tick = order.req.contract.price_tick;
            if tick > 0.0 {
                let steps = price / tick;
                if (steps - steps.round()).abs() > 1e-6 {
                    return ErrorCode::InvalidPrice;
                }
            }
        }
        ErrorCode::NoError
    }
}
