//! The engine core: command dispatch and the order lifecycle state machine.
//!
//! One mutex guards the order registry, the account and the risk chain; it
//! is held for the entirety of every read-modify-write over order state,
//! including the risk hooks and the gateway push (both are non-blocking by
//! contract). The portfolio has its own lock, taken strictly inside the
//! engine mutex whenever both are needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use trader_protocol::{
    CommandBody, CommandBusPuller, CommandRing, OrderCommand, OrderResponse, StrategyId,
    TraderCommand, COMMAND_FRAME_LEN, DEFAULT_RING_CAPACITY,
};

use crate::config::EngineConfig;
use crate::engine_version;
use crate::errors::{EngineError, ErrorCode};
use crate::gateway::{create_gateway, Gateway, GatewayListener};
use crate::io::ResponsePublisher;
use crate::models::{
    Account, CancelRejected, ContractTable, MarketDataSnapshot, Order, OrderAccepted,
    OrderCanceled, OrderRejected, OrderRequest, OrderStatus, Portfolio, Position, TickData,
    TradeEvent, TradeType,
};
use crate::risk::{OrderMap, RiskContext, RiskManager};

const ACCOUNT_QUERY_INTERVAL: Duration = Duration::from_secs(15);

/// Everything the engine mutex protects.
struct EngineCore {
    orders: OrderMap,
    account: Account,
    risk: RiskManager,
    next_engine_order_id: u64,
}

pub struct TradingEngine {
    config: EngineConfig,
    contracts: Arc<ContractTable>,
    core: Mutex<EngineCore>,
    portfolio: Mutex<Portfolio>,
    md: Mutex<MarketDataSnapshot>,
    gateway: OnceLock<Arc<dyn Gateway>>,
    responses: Option<ResponsePublisher>,
    is_logon: AtomicBool,
    /// Handed to gateways as their callback target.
    self_ref: Weak<TradingEngine>,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        contracts: Arc<ContractTable>,
    ) -> Result<Arc<Self>, EngineError> {
        let risk = RiskManager::from_names(&config.rms_rules, &config)?;
        let responses = match &config.response_endpoint {
            Some(endpoint) => Some(ResponsePublisher::bind(endpoint, config.account_id)?),
            None => None,
        };
        Ok(Arc::new_cyclic(|self_ref| Self {
            config,
            contracts,
            core: Mutex::new(EngineCore {
                orders: OrderMap::new(),
                account: Account::default(),
                risk,
                next_engine_order_id: 1,
            }),
            portfolio: Mutex::new(Portfolio::default()),
            md: Mutex::new(MarketDataSnapshot::default()),
            gateway: OnceLock::new(),
            responses,
            is_logon: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    pub fn contracts(&self) -> &ContractTable {
        &self.contracts
    }

    /// Create the gateway, run the startup queries and initialize the risk
    /// chain. Nothing trades until this returns `Ok`.
    pub fn login(&self) -> Result<(), EngineError> {
        info!("================ trading-engine ================");
        info!("version        : {} ({})", env!("CARGO_PKG_VERSION"), engine_version());
        self.config.show();
        info!("================================================");

        let listener: Weak<dyn GatewayListener> = self.self_ref.clone();
        let gateway = create_gateway(&self.config.api, listener, &self.config)?;
        if !gateway.login(&self.config) {
            return Err(EngineError::LoginFailed);
        }
        if self.gateway.set(Arc::clone(&gateway)).is_err() {
            warn!("login called twice, keeping the first gateway");
        }
        info!("login success as {}", self.config.investor_id);

        if !gateway.query_account() {
            return Err(EngineError::StartupQueryFailed("account"));
        }
        if !gateway.query_positions() {
            return Err(EngineError::StartupQueryFailed("positions"));
        }
        if !gateway.query_trades() {
            return Err(EngineError::StartupQueryFailed("trades"));
        }

        {
            let mut core_guard = self.core.lock().unwrap();
            let core = &mut *core_guard;
            let mut portfolio = self.portfolio.lock().unwrap();
            let md = self.md.lock().unwrap();
            let ctx = RiskContext {
                account: &mut core.account,
                portfolio: &mut portfolio,
                md: &md,
            };
            core.risk.init(&self.config, &ctx, &core.orders)?;
        }

        // The virtual gateway is deterministic by design; no background
        // refresh for it.
        if self.config.api != "virtual" {
            let gateway = Arc::clone(&gateway);
            thread::spawn(move || loop {
                thread::sleep(ACCOUNT_QUERY_INTERVAL);
                gateway.query_account();
            });
        }

        self.is_logon.store(true, Ordering::Release);
        info!("init done");
        Ok(())
    }

    /// Consume commands forever. Channel selection follows the config:
    /// a positive key means the shared-memory ring, zero the pub/sub bus.
    pub fn process_commands(&self) -> Result<(), EngineError> {
        if self.config.key_of_cmd_queue > 0 {
            self.process_from_ring()
        } else {
            self.process_from_bus()
        }
    }

    fn process_from_ring(&self) -> Result<(), EngineError> {
        let mut ring = CommandRing::open_or_create(
            &self.config.cmd_shm_dir,
            self.config.key_of_cmd_queue,
            engine_version(),
            DEFAULT_RING_CAPACITY,
        )?;
        let dropped = ring.reset();
        info!(
            "command ring ready at {} ({dropped} stale entries dropped)",
            ring.path().display()
        );

        let mut frame = [0u8; COMMAND_FRAME_LEN];
        loop {
            if !ring.pop(&mut frame) {
                std::hint::spin_loop();
                continue;
            }
            match TraderCommand::decode(&frame) {
                Ok(cmd) => self.execute_cmd(cmd),
                Err(e) => error!("dropping malformed command: {e}"),
            }
        }
    }

    fn process_from_bus(&self) -> Result<(), EngineError> {
        let puller =
            CommandBusPuller::bind(&self.config.cmd_bus_endpoint, self.config.account_id)?;
        info!("pulling commands from topic {}", puller.topic());
        loop {
            if let Some(cmd) = puller.pull() {
                self.execute_cmd(cmd);
            }
        }
    }

    pub fn execute_cmd(&self, cmd: TraderCommand) {
        match cmd.body {
            CommandBody::NewOrder(req) => {
                debug!("new order from {}", cmd.strategy_id);
                self.send_order(cmd.strategy_id, &req);
            }
            CommandBody::CancelOrder { engine_order_id } => {
                debug!("cancel order {engine_order_id}");
                self.cancel_order(engine_order_id);
            }
            CommandBody::CancelTicker { ticker_index } => {
                debug!("cancel all for ticker {ticker_index}");
                self.cancel_for_ticker(ticker_index);
            }
            CommandBody::CancelAll => {
                debug!("cancel all");
                self.cancel_all();
            }
        }
    }

    pub fn send_order(&self, strategy_id: StrategyId, cmd: &OrderCommand) -> bool {
        let Some(contract) = self.contracts.get_by_index(cmd.ticker_index) else {
            error!("send_order: contract not found for index {}", cmd.ticker_index);
            self.publish_command_rejection(cmd, ErrorCode::InvalidContract);
            return false;
        };
        let Some(gateway) = self.gateway.get().cloned() else {
            error!("send_order: not logged in");
            self.publish_command_rejection(cmd, ErrorCode::SendFailed);
            return false;
        };

        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let engine_order_id = core.next_engine_order_id;
        core.next_engine_order_id += 1;

        let order = Order::new(
            OrderRequest {
                engine_order_id,
                contract,
                order_type: cmd.order_type,
                direction: cmd.direction,
                offset: cmd.offset,
                volume: cmd.volume,
                price: cmd.price,
                flags: cmd.flags,
            },
            cmd.user_order_id,
            strategy_id,
        );

        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };

        if !cmd.without_check {
            let code = core.risk.check_order_req(&order, &core.orders, &ctx);
            if !code.is_ok() {
                error!(
                    "send_order: risk rejected {} {:?} {:?} vol {}: {}",
                    order.req.contract.ticker,
                    order.req.direction,
                    order.req.offset,
                    order.req.volume,
                    code
                );
                core.risk.on_order_rejected(&order, code, &mut ctx);
                self.publish_order_event(&order, code, 0, 0.0, true);
                return false;
            }
        }

        if !gateway.send_order(&order.req) {
            error!(
                "send_order: gateway refused {} {:?} {:?} vol {} px {:.3}",
                order.req.contract.ticker,
                order.req.direction,
                order.req.offset,
                order.req.volume,
                order.req.price
            );
            core.risk.on_order_rejected(&order, ErrorCode::SendFailed, &mut ctx);
            self.publish_order_event(&order, ErrorCode::SendFailed, 0, 0.0, true);
            return false;
        }

        core.risk.on_order_sent(&order, &mut ctx);
        debug!(
            "send_order: {} {:?} {:?} engine id {} vol {} px {:.3}",
            order.req.contract.ticker,
            order.req.direction,
            order.req.offset,
            engine_order_id,
            order.req.volume,
            order.req.price
        );
        core.orders.insert(engine_order_id, order);
        true
    }

    /// Cancel one order. Uses the broker id when the broker has assigned
    /// one; before that the engine id is forwarded as-is and a broker-side
    /// rejection comes back through `on_order_cancel_rejected`.
    pub fn cancel_order(&self, engine_order_id: u64) {
        let Some(gateway) = self.gateway.get().cloned() else {
            error!("cancel_order: not logged in");
            return;
        };
        let mut core = self.core.lock().unwrap();
        match core.orders.get_mut(&engine_order_id) {
            Some(order) => issue_cancel(gateway.as_ref(), order),
            None => {
                warn!("cancel_order: order {engine_order_id} not in registry, forwarding anyway");
                gateway.cancel_order(engine_order_id);
            }
        }
    }

    pub fn cancel_for_ticker(&self, ticker_index: u32) {
        let Some(gateway) = self.gateway.get().cloned() else {
            error!("cancel_for_ticker: not logged in");
            return;
        };
        let mut core = self.core.lock().unwrap();
        for order in core.orders.values_mut() {
            if order.req.contract.index == ticker_index {
                issue_cancel(gateway.as_ref(), order);
            }
        }
    }

    pub fn cancel_all(&self) {
        let Some(gateway) = self.gateway.get().cloned() else {
            error!("cancel_all: not logged in");
            return;
        };
        let mut core = self.core.lock().unwrap();
        for order in core.orders.values_mut() {
            issue_cancel(gateway.as_ref(), order);
        }
    }

    fn on_secondary_market_traded(&self, rsp: TradeEvent) {
        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let Some(order) = core.orders.get_mut(&rsp.engine_order_id) else {
            warn!(
                "on_order_traded: order {} not found (traded {} @ {:.3})",
                rsp.engine_order_id, rsp.volume, rsp.price
            );
            return;
        };
        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };

        if !order.accepted {
            order.accepted = true;
            if order.status == OrderStatus::Submitting {
                order.status = OrderStatus::Accepted;
            }
            core.risk.on_order_accepted(order, &mut ctx);
            info!(
                "order accepted (first fill): {} {:?} vol {}",
                order.req.contract.ticker, order.req.direction, order.req.volume
            );
        }
        order.order_id = rsp.order_id;

        let mut fill = rsp.volume;
        if fill > order.remaining() {
            warn!(
                "on_order_traded: clamping fill {} to remaining {} for order {}",
                fill,
                order.remaining(),
                order.req.engine_order_id
            );
            fill = order.remaining();
        }
        if fill <= 0 {
            return;
        }
        order.traded_volume += fill;
        info!(
            "order traded: {} {:?} {:?} fill {} @ {:.3}, {}/{}",
            order.req.contract.ticker,
            order.req.direction,
            order.req.offset,
            fill,
            rsp.price,
            order.traded_volume,
            order.req.volume
        );

        let event = TradeEvent {
            volume: fill,
            ..rsp
        };
        core.risk.on_order_traded(order, &event, &mut ctx);

        let terminal = order.is_terminal();
        if terminal {
            order.status = OrderStatus::Done;
        }
        self.publish_order_event(order, ErrorCode::NoError, fill as u32, rsp.price, terminal);
        if terminal {
            info!(
                "order completed: {} {:?} {:?} broker id {}, traded {}/{}",
                order.req.contract.ticker,
                order.req.direction,
                order.req.offset,
                order.order_id,
                order.traded_volume,
                order.req.volume
            );
            core.risk.on_order_completed(order, &mut ctx);
            core.orders.remove(&rsp.engine_order_id);
        }
    }

    fn on_primary_market_traded(&self, rsp: TradeEvent) {
        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let Some(order) = core.orders.get_mut(&rsp.engine_order_id) else {
            warn!(
                "on_primary_market_traded: order {} not found (traded {} @ {:.3})",
                rsp.engine_order_id, rsp.volume, rsp.price
            );
            return;
        };
        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };

        if !order.accepted {
            order.accepted = true;
            if order.status == OrderStatus::Submitting {
                order.status = OrderStatus::Accepted;
            }
            core.risk.on_order_accepted(order, &mut ctx);
            info!(
                "order accepted (primary market): {} {:?} vol {}",
                order.req.contract.ticker, order.req.direction, order.req.volume
            );
        }
        order.order_id = rsp.order_id;

        if rsp.trade_type == TradeType::PrimaryMarket {
            order.traded_volume = rsp.volume.min(order.req.volume);
            core.risk.on_order_traded(order, &rsp, &mut ctx);
            order.status = OrderStatus::Done;
            info!(
                "primary-market order done: {} {:?} vol {}",
                order.req.contract.ticker, order.req.direction, order.req.volume
            );
            core.risk.on_order_completed(order, &mut ctx);
            self.publish_order_event(
                order,
                ErrorCode::NoError,
                rsp.volume.max(0) as u32,
                rsp.price,
                true,
            );
            core.orders.remove(&rsp.engine_order_id);
        } else {
            // Holdings-impacting but not terminal: acquisition, release,
            // cash substitution.
            core.risk.on_order_traded(order, &rsp, &mut ctx);
        }
    }

    fn publish_order_event(
        &self,
        order: &Order,
        code: ErrorCode,
        this_traded: u32,
        this_traded_price: f64,
        completed: bool,
    ) {
        let Some(responses) = &self.responses else {
            return;
        };
        responses.publish(&OrderResponse {
            user_order_id: order.user_order_id,
            order_id: order.order_id,
            ticker_index: order.req.contract.index,
            direction: order.req.direction,
            offset: order.req.offset,
            original_volume: order.req.volume,
            traded_volume: order.traded_volume,
            completed,
            error_code: code.code(),
            this_traded,
            this_traded_price,
        });
    }

    /// Rejections that happen before an `Order` exists (unknown contract,
    /// no gateway).
    fn publish_command_rejection(&self, cmd: &OrderCommand, code: ErrorCode) {
        let Some(responses) = &self.responses else {
            return;
        };
        responses.publish(&OrderResponse {
            user_order_id: cmd.user_order_id,
            order_id: 0,
            ticker_index: cmd.ticker_index,
            direction: cmd.direction,
            offset: cmd.offset,
            original_volume: cmd.volume,
            traded_volume: 0,
            completed: true,
            error_code: code.code(),
            this_traded: 0,
            this_traded_price: 0.0,
        });
    }
}

fn issue_cancel(gateway: &dyn Gateway, order: &mut Order) {
    if order.status != OrderStatus::Done {
        order.status = OrderStatus::Canceling;
    }
    let target = if order.order_id != 0 {
        order.order_id
    } else {
        order.req.engine_order_id
    };
    if !gateway.cancel_order(target) {
        warn!(
            "gateway refused cancel for order {}",
            order.req.engine_order_id
        );
    }
}

impl GatewayListener for TradingEngine {
    fn on_query_account(&self, account: Account) {
        let mut core = self.core.lock().unwrap();
        core.account = account;
        info!(
            "account: total {:.3}, frozen {:.3}, margin {:.3}, balance {:.3}",
            core.account.total_asset, core.account.frozen, core.account.margin, core.account.balance
        );
    }

    fn on_query_position(&self, position: Position) {
        let Some(contract) = self.contracts.get_by_index(position.ticker_index) else {
            warn!(
                "on_query_position: unknown ticker index {}",
                position.ticker_index
            );
            return;
        };
        let (lp, sp) = (&position.long, &position.short);
        info!(
            "position {}: long {} (yd {}, frozen {}, cost {:.2}), short {} (yd {}, frozen {}, cost {:.2})",
            contract.ticker,
            lp.holdings, lp.yd_holdings, lp.frozen, lp.cost_price,
            sp.holdings, sp.yd_holdings, sp.frozen, sp.cost_price
        );
        if lp.is_empty() && sp.is_empty() {
            return;
        }
        self.portfolio.lock().unwrap().set_position(position);
    }

    fn on_query_trade(&self, trade: TradeEvent) {
        self.portfolio.lock().unwrap().update_on_query_trade(
            trade.ticker_index,
            trade.direction,
            trade.offset,
            trade.volume,
        );
    }

    fn on_tick(&self, tick: TickData) {
        if !self.is_logon.load(Ordering::Acquire) {
            return;
        }
        self.md.lock().unwrap().update_snapshot(tick);
    }

    /// The broker took the order; latch acceptance and remember the broker
    /// id. A second ack (or an ack after the first fill) is a no-op.
    fn on_order_accepted(&self, rsp: OrderAccepted) {
        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let Some(order) = core.orders.get_mut(&rsp.engine_order_id) else {
            warn!("on_order_accepted: order {} not found", rsp.engine_order_id);
            return;
        };
        if order.accepted {
            return;
        }
        order.order_id = rsp.order_id;
        order.accepted = true;
        if order.status == OrderStatus::Submitting {
            order.status = OrderStatus::Accepted;
        }

        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };
        core.risk.on_order_accepted(order, &mut ctx);
        info!(
            "order accepted: {} {:?} {:?} vol {} px {:.2}",
            order.req.contract.ticker,
            order.req.direction,
            order.req.offset,
            order.req.volume,
            order.req.price
        );
        self.publish_order_event(order, ErrorCode::NoError, 0, 0.0, false);
    }

    /// A rejected order never becomes active: hooks fire, then it is gone.
    fn on_order_rejected(&self, rsp: OrderRejected) {
        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let Some(order) = core.orders.get(&rsp.engine_order_id) else {
            warn!("on_order_rejected: order {} not found", rsp.engine_order_id);
            return;
        };

        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };
        core.risk.on_order_rejected(order, ErrorCode::Rejected, &mut ctx);
        error!(
            "order rejected ({}): {} {:?} {:?} vol {} px {:.3}",
            rsp.reason,
            order.req.contract.ticker,
            order.req.direction,
            order.req.offset,
            order.req.volume,
            order.req.price
        );
        self.publish_order_event(order, ErrorCode::Rejected, 0, 0.0, true);
        core.orders.remove(&rsp.engine_order_id);
    }

    fn on_order_traded(&self, rsp: TradeEvent) {
        if rsp.trade_type == TradeType::SecondaryMarket {
            self.on_secondary_market_traded(rsp);
        } else {
            self.on_primary_market_traded(rsp);
        }
    }

    fn on_order_canceled(&self, rsp: OrderCanceled) {
        let mut core_guard = self.core.lock().unwrap();
        let core = &mut *core_guard;
        let Some(order) = core.orders.get_mut(&rsp.engine_order_id) else {
            warn!("on_order_canceled: order {} not found", rsp.engine_order_id);
            return;
        };

        let mut canceled = rsp.canceled_volume.max(0);
        let cap = order.req.volume - order.traded_volume;
        if canceled > cap {
            warn!(
                "on_order_canceled: clamping canceled {} to {} for order {}",
                canceled, cap, rsp.engine_order_id
            );
            canceled = cap;
        }
        order.canceled_volume = canceled;

        let mut portfolio = self.portfolio.lock().unwrap();
        let md = self.md.lock().unwrap();
        let mut ctx = RiskContext {
            account: &mut core.account,
            portfolio: &mut portfolio,
            md: &md,
        };
        info!(
            "order canceled: {} {:?} {:?} broker id {}, canceled {}",
            order.req.contract.ticker,
            order.req.direction,
            order.req.offset,
            order.order_id,
            canceled
        );
        core.risk.on_order_canceled(order, canceled, &mut ctx);

        let terminal = order.is_terminal();
        order.status = if terminal {
            OrderStatus::Done
        } else {
            OrderStatus::Accepted
        };
        self.publish_order_event(order, ErrorCode::NoError, 0, 0.0, terminal);
        if terminal {
            info!(
                "order completed: {} {:?} {:?} broker id {}, traded {}/{}",
                order.req.contract.ticker,
                order.req.direction,
                order.req.offset,
                order.order_id,
                order.traded_volume,
                order.req.volume
            );
            core.risk.on_order_completed(order, &mut ctx);
            core.orders.remove(&rsp.engine_order_id);
        }
    }

    fn on_order_cancel_rejected(&self, rsp: CancelRejected) {
        warn!(
            "cancel rejected for order {}: {}",
            rsp.engine_order_id, rsp.reason
        );
    }
}
