use std::sync::Arc;

use clap::Parser;
use log::info;

use trading_engine::io::Args;
use trading_engine::models::ContractTable;
use trading_engine::{EngineConfig, TradingEngine};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = EngineConfig::load(&args.config)?;

    let contracts = match &config.contracts_file {
        Some(path) => ContractTable::load_json(path)?,
        None => ContractTable::default(),
    };
    info!("{} contracts loaded", contracts.len());

    let engine = TradingEngine::new(config, Arc::new(contracts))?;
    engine.login()?;

    // Never returns; fatal channel errors surface as Err and a nonzero exit.
    engine.process_commands()?;
    Ok(())
}
