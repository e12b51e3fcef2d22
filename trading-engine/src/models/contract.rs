use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProductClass {
    Futures,
    Stock,
    Fund,
    Bond,
    Index,
    Options,
}

/// Instrument metadata, immutable after load. Orders hold these behind
/// `Arc`, so a contract outlives every order that references it.
#[derive(Debug, Clone, Deserialize)]
pub struct Contract {
    /// Dense index assigned at load time; the key strategies use on the wire.
    pub index: u32,
    pub ticker: String,
    pub exchange: String,
    pub product: ProductClass,
    pub price_tick: f64,
    /// Contract multiplier (units of underlying per lot).
    pub size: i32,
    #[serde(default)]
    pub long_margin_rate: f64,
    #[serde(default)]
    pub short_margin_rate: f64,
}

/// Process-wide read-only contract lookup, populated before login and never
/// mutated afterwards.
#[derive(Debug, Default)]
pub struct ContractTable {
    by_index: HashMap<u32, Arc<Contract>>,
    by_ticker: HashMap<String, Arc<Contract>>,
}

impl ContractTable {
    pub fn from_contracts(contracts: Vec<Contract>) -> Self {
        let mut by_index = HashMap::new();
        let mut by_ticker = HashMap::new();
        for contract in contracts {
            let contract = Arc::new(contract);
            by_ticker.insert(contract.ticker.clone(), Arc::clone(&contract));
            by_index.insert(contract.index, contract);
        }
        Self {
            by_index,
            by_ticker,
        }
    }

    pub fn load_json(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        let contracts: Vec<Contract> = serde_json::from_str(&text)?;
        Ok(Self::from_contracts(contracts))
    }

    pub fn get_by_index(&self, index: u32) -> Option<Arc<Contract>> {
        self.by_index.get(&index).cloned()
    }

    pub fn get_by_ticker(&self, ticker: &str) -> Option<Arc<Contract>> {
        self.by_ticker.get(ticker).cloned()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil::contract as test_contract;

    #[test]
    fn lookup_by_index_and_ticker() {
        let table = ContractTable::from_contracts(vec![
            test_contract(0, "rb2610"),
            test_contract(1, "hc2610"),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get_by_index(1).unwrap().ticker, "hc2610");
        assert_eq!(table.get_by_ticker("rb2610").unwrap().index, 0);
        assert!(table.get_by_index(2).is_none());
    }

    #[test]
    fn loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contracts.json");
        std::fs::write(
            &path,
            r#"[{"index": 0, "ticker": "rb2610", "exchange": "SHFE",
                 "product": "Futures", "price_tick": 1.0, "size": 10,
                 "long_margin_rate": 0.1, "short_margin_rate": 0.1}]"#,
        )
        .unwrap();
        let table = ContractTable::load_json(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_by_index(0).unwrap().ticker, "rb2610");
    }
}
