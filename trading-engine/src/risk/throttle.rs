use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::{OrderMap, RiskContext, RiskRule};
use crate::config::RiskSettings;
use crate::errors::ErrorCode;
use crate::models::Order;

/// Sliding-window cap on order submissions. Only sends that actually reached
/// the gateway count against the window.
pub struct ThrottleRule {
    window: Duration,
    max_orders: usize,
    sent_at: VecDeque<Instant>,
}

impl ThrottleRule {
    pub fn new(settings: &RiskSettings) -> Self {
        Self {
            window: Duration::from_millis(settings.throttle_window_ms),
            max_orders: settings.throttle_max_orders,
            sent_at: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&front) = self.sent_at.front() {
            if now.duration_since(front) >= self.window {
                self.sent_at.pop_front();
            } else {
                break;
            }
        }
    }
}

impl RiskRule for ThrottleRule {
    fn name(&self) -> &'static str {
        "Throttle"
    }

    fn check_order_req(&mut self, _order: &Order, _orders: &OrderMap, _ctx: &RiskContext) -> ErrorCode {
        let now = Instant::now();
        self.evict(now);
        if self.sent_at.len() >= self.max_orders {
            return ErrorCode::Throttled;
        }
        ErrorCode::NoError
    }

    fn on_order_sent(&mut self, _order: &Order, _ctx: &mut RiskContext) {
        let now = Instant::now();
        self.evict(now);
        self.sent_at.push_back(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, MarketDataSnapshot, Portfolio};
    use crate::models::testutil;

    fn settings(window_ms: u64, max_orders: usize) -> RiskSettings {
        RiskSettings {
            throttle_window_ms: window_ms,
            throttle_max_orders: max_orders,
            ..Default::default()
        }
    }

    fn drive(rule: &mut ThrottleRule, sends: usize) -> ErrorCode {
        let mut account = Account::default();
        let mut portfolio = Portfolio::default();
        let md = MarketDataSnapshot::default();
        let order = testutil::order(1, 1);
        for _ in 0..sends {
            let mut ctx = RiskContext {
                account: &mut account,
                portfolio: &mut portfolio,
                md: &md,
            };
            rule.on_order_sent(&order, &mut ctx);
        }
        let ctx = RiskContext {
            account: &mut account,
            portfolio: &mut portfolio,
            md: &md,
        };
        rule.check_order_req(&order, &OrderMap::new(), &ctx)
    }

    #[test]
    fn caps_orders_inside_window() {
        let mut rule = ThrottleRule::new(&settings(10_000, 2));
        assert_eq!(drive(&mut rule, 2), ErrorCode::Throttled);
    }

    #[test]
    fn passes_under_the_cap() {
        let mut rule = ThrottleRule::new(&settings(10_000, 2));
        assert_eq!(drive(&mut rule, 1), ErrorCode::NoError);
    }

    #[test]
    fn expired_sends_free_the_window() {
        let mut rule = ThrottleRule::new(&settings(0, 1));
        // Zero-length window: every send is already expired.
        assert_eq!(drive(&mut rule, 3), ErrorCode::NoError);
    }
}
