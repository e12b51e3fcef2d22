use super::{OrderMap, RiskContext, RiskRule};
use crate::config::RiskSettings;
use crate::errors::ErrorCode;
use crate::models::Order;

/// Keeps limit prices inside the exchange band: the tick's limit prices when
/// the feed carries them, otherwise a configured fraction around the last
/// price. Tickers with no snapshot yet pass unless `strict` is set.
pub struct PriceBandRule {
    ratio: f64,
    strict: bool,
}

impl PriceBandRule {
    pub fn new(settings: &RiskSettings) -> Self {
        Self {
            ratio: settings.price_band_ratio,
            strict: settings.price_band_strict,
        }
    }
}

impl RiskRule for PriceBandRule {
    fn name(&self) -> &'static str {
        "PriceBand"
    }

    fn check_order_req(&mut self, order: &Order, _orders: &OrderMap, ctx: &RiskContext) -> ErrorCode {
        if !order.req.order_type.carries_price() {
            return ErrorCode::NoError;
        }
        let Some(tick) = ctx.md.get(order.req.contract.index) else {
            return if self.strict {
                ErrorCode::PriceOutOfBand
            } else {
                ErrorCode::NoError
            };
        };
        let (lower, upper) = if tick.upper_limit > 0.0 {
            (tick.lower_limit, tick.upper_limit)
        } else if tick.last_price > 0.0 {
            (
                tick.last_price * (1.0 - self.ratio),
                tick.last_price * (1.0 + self.ratio),
            )
        } else {
            return ErrorCode::NoError;
        };
        if order.req.price < lower || order.req.price > upper {
            return ErrorCode::PriceOutOfBand;
        }
        ErrorCode::NoError
    }
}
