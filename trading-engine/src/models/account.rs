use serde::Deserialize;

/// Cash state of the trading account. A single instance lives in the engine
/// and is overwritten wholesale by every `query_account` round trip; the
/// risk chain adjusts `frozen`/`margin` between refreshes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    pub account_id: u64,
    pub total_asset: f64,
    /// Engine-frozen cash backing not-yet-filled opens.
    pub frozen: f64,
    pub margin: f64,
    /// Spendable cash.
    pub balance: f64,
}

impl Account {
    pub fn available(&self) -> f64 {
        self.balance - self.frozen
    }
}
