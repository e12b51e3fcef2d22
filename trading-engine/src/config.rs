use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Deserialize;

use crate::errors::EngineError;

fn default_shm_dir() -> PathBuf {
    PathBuf::from("/dev/shm")
}

fn default_bus_endpoint() -> String {
    "tcp://127.0.0.1:9617".to_string()
}

fn default_rules() -> Vec<String> {
    ["sanity", "price_band", "fund", "position", "self_trade", "throttle"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_price_band_ratio() -> f64 {
    0.1
}

fn default_throttle_window_ms() -> u64 {
    1000
}

fn default_throttle_max_orders() -> usize {
    50
}

/// Tuning knobs read by the standard risk rules at init.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    /// Allowed fraction around the last price when the tick carries no
    /// exchange limit prices.
    #[serde(default = "default_price_band_ratio")]
    pub price_band_ratio: f64,

    /// Reject orders for tickers with no market-data snapshot yet.
    #[serde(default)]
    pub price_band_strict: bool,

    #[serde(default = "default_throttle_window_ms")]
    pub throttle_window_ms: u64,

    #[serde(default = "default_throttle_max_orders")]
    pub throttle_max_orders: usize,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            price_band_ratio: default_price_band_ratio(),
            price_band_strict: false,
            throttle_window_ms: default_throttle_window_ms(),
            throttle_max_orders: default_throttle_max_orders(),
        }
    }
}

/// Engine configuration. Unknown keys are ignored so one deployment file can
/// feed several processes; gateway-specific keys ride along untouched in
/// `gateway`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Gateway variant name, resolved by the gateway factory.
    pub api: String,

    #[serde(default)]
    pub investor_id: String,

    pub account_id: u64,

    /// Shared-memory channel key. 0 selects the pub/sub fallback.
    #[serde(default)]
    pub key_of_cmd_queue: u32,

    #[serde(default = "default_shm_dir")]
    pub cmd_shm_dir: PathBuf,

    #[serde(default = "default_bus_endpoint")]
    pub cmd_bus_endpoint: String,

    /// Where order responses are published. Absent disables publication.
    #[serde(default)]
    pub response_endpoint: Option<String>,

    #[serde(default)]
    pub contracts_file: Option<PathBuf>,

    /// Ordered risk chain. Names are resolved by the rule factory; an
    /// unknown name aborts login.
    #[serde(default = "default_rules")]
    pub rms_rules: Vec<String>,

    #[serde(default)]
    pub risk: RiskSettings,

    /// Opaque passthrough for the selected gateway.
    #[serde(default)]
    pub gateway: serde_json::Value,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn show(&self) {
        info!("api            : {}", self.api);
        info!("investor_id    : {}", self.investor_id);
        info!("account_id     : {}", self.account_id);
        info!("cmd channel    : {}", if self.key_of_cmd_queue > 0 {
            format!("shm ring key {}", self.key_of_cmd_queue)
        } else {
            format!("bus {}", self.cmd_bus_endpoint)
        });
        info!("rms_rules      : {:?}", self.rms_rules);
    }
}
