use std::path::PathBuf;

use clap::Parser;
use log::info;

use trader_protocol::{
    CommandBody, CommandSender, Direction, OrderCommand, OrderOffset, OrderType, StrategyId,
    TraderCommand,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Shared-memory channel key; omit to use the pub/sub bus instead
    #[arg(long)]
    shm_key: Option<u32>,

    #[arg(long, default_value = "/dev/shm")]
    shm_dir: PathBuf,

    #[arg(long, default_value = "tcp://127.0.0.1:9617")]
    bus_endpoint: String,

    #[arg(long, default_value_t = 8801)]
    account_id: u64,

    #[arg(long, default_value_t = 0)]
    ticker_index: u32,

    #[arg(long, default_value_t = 1)]
    volume: i32,

    #[arg(long, default_value_t = 100.0)]
    price: f64,

    /// Follow the order with a cancel-all
    #[arg(long)]
    cancel_all: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let sender = match args.shm_key {
        Some(key) => {
            CommandSender::ring(&args.shm_dir, key, trading_engine::engine_version())?
        }
        None => CommandSender::bus(&args.bus_endpoint, args.account_id)?,
    };

    let strategy_id = StrategyId::new("demo");
    sender.send(&TraderCommand {
        strategy_id,
        body: CommandBody::NewOrder(OrderCommand {
            user_order_id: 1,
            ticker_index: args.ticker_index,
            direction: Direction::Buy,
            offset: OrderOffset::Open,
            order_type: OrderType::Limit,
            volume: args.volume,
            price: args.price,
            flags: 0,
            without_check: false,
        }),
    })?;
    info!(
        "sent: buy {} x{} @ {:.2}",
        args.ticker_index, args.volume, args.price
    );

    if args.cancel_all {
        sender.send(&TraderCommand {
            strategy_id,
            body: CommandBody::CancelAll,
        })?;
        info!("sent: cancel all");
    }

    Ok(())
}
