use std::collections::HashMap;

use serde::Deserialize;

/// Last-seen market state for one instrument.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TickData {
    pub ticker_index: u32,
    pub last_price: f64,
    pub bid: f64,
    pub ask: f64,
    /// Exchange limit-up price, 0 when the feed does not carry one.
    pub upper_limit: f64,
    pub lower_limit: f64,
    pub timestamp_ms: i64,
}

/// Last tick per ticker index. Consumed only by risk rules.
#[derive(Debug, Default)]
pub struct MarketDataSnapshot {
    ticks: HashMap<u32, TickData>,
}

impl MarketDataSnapshot {
    pub fn update_snapshot(&mut self, tick: TickData) {
        self.ticks.insert(tick.ticker_index, tick);
    }

    pub fn get(&self, ticker_index: u32) -> Option<&TickData> {
        self.ticks.get(&ticker_index)
    }
}
