use super::{OrderMap, RiskContext, RiskRule};
use crate::errors::ErrorCode;
use crate::models::{Order, OrderStatus};
use trader_protocol::Direction;

/// Rejects an order that could match against one of this engine's own live
/// orders on the other side of the same instrument.
pub struct SelfTradeRule;

impl SelfTradeRule {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SelfTradeRule {
    fn default() -> Self {
        Self::new()
    }
}

fn crosses(incoming: &Order, resting: &Order) -> bool {
    // Either side without a firm price has to be assumed marketable.
    if !incoming.req.order_type.carries_price() || !resting.req.order_type.carries_price() {
        return true;
    }
    match incoming.req.direction {
        Direction::Buy => incoming.req.price >= resting.req.price,
        Direction::Sell => incoming.req.price <= resting.req.price,
    }
}

impl RiskRule for SelfTradeRule {
    fn name(&self) -> &'static str {
        "SelfTrade"
    }

    fn check_order_req(&mut self, order: &Order, orders: &OrderMap, _ctx: &RiskContext) -> ErrorCode {
        let opposite = order.req.direction.opposite();
        for resting in orders.values() {
            if resting.status == OrderStatus::Done {
                continue;
            }
            if resting.req.contract.index != order.req.contract.index {
                continue;
            }
            if resting.req.direction != opposite {
                continue;
            }
            if crosses(order, resting) {
                return ErrorCode::SelfTrade;
            }
        }
        ErrorCode::NoError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, MarketDataSnapshot, OrderType, Portfolio};
    use crate::models::testutil;

    fn check(order: &Order, orders: &OrderMap) -> ErrorCode {
        let mut account = Account::default();
        let mut portfolio = Portfolio::default();
        let md = MarketDataSnapshot::default();
        let ctx = RiskContext {
            account: &mut account,
            portfolio: &mut portfolio,
            md: &md,
        };
        SelfTradeRule::new().check_order_req(order, orders, &ctx)
    }

    fn resting_sell(engine_order_id: u64, price: f64) -> Order {
        let mut order = testutil::order(engine_order_id, 10);
        order.req.direction = Direction::Sell;
        order.req.price = price;
        order
    }

    #[test]
    fn crossing_own_sell_is_rejected() {
        let mut orders = OrderMap::new();
        orders.insert(1, resting_sell(1, 99.0));

        let buy = testutil::order(2, 5); // buy at 100.0 crosses the 99.0 sell
        assert_eq!(check(&buy, &orders), ErrorCode::SelfTrade);
    }

    #[test]
    fn non_crossing_price_passes() {
        let mut orders = OrderMap::new();
        orders.insert(1, resting_sell(1, 101.0));

        let buy = testutil::order(2, 5); // buy at 100.0 sits below the sell
        assert_eq!(check(&buy, &orders), ErrorCode::NoError);
    }

    #[test]
    fn same_side_and_other_ticker_pass() {
        let mut orders = OrderMap::new();
        orders.insert(1, testutil::order(1, 10)); // same side

        let mut other_ticker = resting_sell(2, 99.0);
        other_ticker.req.contract = std::sync::Arc::new(testutil::contract(8, "hc2610"));
        orders.insert(2, other_ticker);

        let buy = testutil::order(3, 5);
        assert_eq!(check(&buy, &orders), ErrorCode::NoError);
    }

    #[test]
    fn market_order_against_resting_is_rejected() {
        let mut orders = OrderMap::new();
        orders.insert(1, resting_sell(1, 200.0)); // far away, but...

        let mut buy = testutil::order(2, 5);
        buy.req.order_type = OrderType::Market; // ...a market buy can reach it
        assert_eq!(check(&buy, &orders), ErrorCode::SelfTrade);
    }
}
