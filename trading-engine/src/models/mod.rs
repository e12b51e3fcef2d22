pub mod account;
pub mod contract;
pub mod execution;
pub mod market;
pub mod order;
pub mod position;

pub use account::*;
pub use contract::*;
pub use execution::*;
pub use market::*;
pub use order::*;
pub use position::*;

/// Fixtures shared by unit tests across the crate.
#[cfg(test)]
pub(crate) mod testutil {
    use std::sync::Arc;

    use trader_protocol::StrategyId;

    use super::*;

    pub fn contract(index: u32, ticker: &str) -> Contract {
        Contract {
            index,
            ticker: ticker.to_string(),
            exchange: "SHFE".to_string(),
            product: ProductClass::Futures,
            price_tick: 0.2,
            size: 10,
            long_margin_rate: 0.1,
            short_margin_rate: 0.1,
        }
    }

    pub fn order(engine_order_id: u64, volume: i32) -> Order {
        order_on(engine_order_id, Arc::new(contract(7, "rb2610")), volume)
    }

    pub fn order_on(engine_order_id: u64, contract: Arc<Contract>, volume: i32) -> Order {
        Order::new(
            OrderRequest {
                engine_order_id,
                contract,
                order_type: OrderType::Limit,
                direction: Direction::Buy,
                offset: OrderOffset::Open,
                volume,
                price: 100.0,
                flags: 0,
            },
            1,
            StrategyId::new("t"),
        )
    }
}
