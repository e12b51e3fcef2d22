//! Deterministic in-process broker used for simulation and local runs.
//!
//! Requests go through an internal queue to a worker thread, which fires the
//! listener callbacks the way a real driver would from its own thread. The
//! engine therefore exercises the exact same locking paths as in production.

use std::collections::HashMap;
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, Weak};
use std::thread;

use chrono::Utc;
use log::{info, warn};

use super::{Gateway, GatewayListener};
use crate::config::EngineConfig;
use crate::models::{
    Account, CancelRejected, OrderAccepted, OrderCanceled, OrderRequest, TradeEvent, TradeType,
};

const DEFAULT_INITIAL_BALANCE: f64 = 10_000_000.0;
const DEFAULT_FILL_PRICE: f64 = 100.0;

enum SimRequest {
    Order(OrderRequest),
    Cancel(u64),
    QueryAccount,
}

#[derive(Clone, Copy, PartialEq)]
enum FillMode {
    /// Ack then fill the full volume immediately.
    Full,
    /// Ack and let the order rest until canceled.
    Resting,
}

struct RestingOrder {
    engine_order_id: u64,
    remaining: i32,
}

pub struct VirtualGateway {
    tx: Mutex<Sender<SimRequest>>,
    _worker: thread::JoinHandle<()>,
}

impl VirtualGateway {
    pub fn new(listener: Weak<dyn GatewayListener>, config: &EngineConfig) -> Self {
        let fill_mode = match config.gateway["fill_mode"].as_str() {
            Some("resting") => FillMode::Resting,
            _ => FillMode::Full,
        };
        let account = Account {
            account_id: config.account_id,
            balance: config.gateway["initial_balance"]
                .as_f64()
                .unwrap_or(DEFAULT_INITIAL_BALANCE),
            ..Default::default()
        };

        let (tx, rx) = mpsc::channel::<SimRequest>();
        let worker = thread::spawn(move || {
            let mut next_order_id: u64 = 1;
            let mut resting: HashMap<u64, RestingOrder> = HashMap::new();

            for request in rx {
                let Some(listener) = listener.upgrade() else {
                    break;
                };
                match request {
                    SimRequest::Order(req) => {
                        let order_id = next_order_id;
                        next_order_id += 1;
                        listener.on_order_accepted(OrderAccepted {
                            engine_order_id: req.engine_order_id,
                            order_id,
                        });
                        match fill_mode {
                            FillMode::Full => {
                                let price = if req.price > 0.0 {
                                    req.price
                                } else {
                                    DEFAULT_FILL_PRICE
                                };
                                listener.on_order_traded(TradeEvent {
                                    engine_order_id: req.engine_order_id,
                                    order_id,
                                    ticker_index: req.contract.index,
                                    direction: req.direction,
                                    offset: req.offset,
                                    trade_type: TradeType::SecondaryMarket,
                                    volume: req.volume,
                                    price,
                                    timestamp_ms: Utc::now().timestamp_millis(),
                                });
                            }
                            FillMode::Resting => {
                                resting.insert(
                                    order_id,
                                    RestingOrder {
                                        engine_order_id: req.engine_order_id,
                                        remaining: req.volume,
                                    },
                                );
                            }
                        }
                    }
                    SimRequest::Cancel(order_id) => match resting.remove(&order_id) {
                        Some(order) => {
                            listener.on_order_canceled(OrderCanceled {
                                engine_order_id: order.engine_order_id,
                                canceled_volume: order.remaining,
                            });
                        }
                        None => {
                            listener.on_order_cancel_rejected(CancelRejected {
                                engine_order_id: order_id,
                                reason: "order not found".to_string(),
                            });
                        }
                    },
                    SimRequest::QueryAccount => {
                        listener.on_query_account(account.clone());
                    }
                }
            }
        });

        Self {
            tx: Mutex::new(tx),
            _worker: worker,
        }
    }

    fn enqueue(&self, request: SimRequest) -> bool {
        match self.tx.lock().unwrap().send(request) {
            Ok(()) => true,
            Err(_) => {
                warn!("virtual gateway worker is gone");
                false
            }
        }
    }
}

impl Gateway for VirtualGateway {
    fn login(&self, config: &EngineConfig) -> bool {
        info!("virtual gateway up for account {}", config.account_id);
        true
    }

    fn logout(&self) {}

    fn query_account(&self) -> bool {
        self.enqueue(SimRequest::QueryAccount)
    }

    fn query_positions(&self) -> bool {
        // A fresh simulation has nothing to report.
        true
    }

    fn query_trades(&self) -> bool {
        true
    }

    fn send_order(&self, req: &OrderRequest) -> bool {
        self.enqueue(SimRequest::Order(req.clone()))
    }

    fn cancel_order(&self, order_id: u64) -> bool {
        self.enqueue(SimRequest::Cancel(order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testutil;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct RecordingListener {
        accepted: Mutex<Vec<OrderAccepted>>,
        traded: Mutex<Vec<TradeEvent>>,
        canceled: Mutex<Vec<OrderCanceled>>,
        cancel_rejected: Mutex<Vec<CancelRejected>>,
        accounts: Mutex<Vec<Account>>,
    }

    impl GatewayListener for RecordingListener {
        fn on_query_account(&self, account: Account) {
            self.accounts.lock().unwrap().push(account);
        }
        fn on_query_position(&self, _position: crate::models::Position) {}
        fn on_query_trade(&self, _trade: TradeEvent) {}
        fn on_tick(&self, _tick: crate::models::TickData) {}
        fn on_order_accepted(&self, rsp: OrderAccepted) {
            self.accepted.lock().unwrap().push(rsp);
        }
        fn on_order_rejected(&self, _rsp: crate::models::OrderRejected) {}
        fn on_order_traded(&self, rsp: TradeEvent) {
            self.traded.lock().unwrap().push(rsp);
        }
        fn on_order_canceled(&self, rsp: OrderCanceled) {
            self.canceled.lock().unwrap().push(rsp);
        }
        fn on_order_cancel_rejected(&self, rsp: CancelRejected) {
            self.cancel_rejected.lock().unwrap().push(rsp);
        }
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for callback");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn config(extra: &str) -> EngineConfig {
        serde_json::from_str(&format!(
            r#"{{"api": "virtual", "account_id": 1, "gateway": {extra}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn full_mode_acks_then_fills() {
        let listener = Arc::new(RecordingListener::default());
        let weak: Weak<dyn GatewayListener> = Arc::downgrade(&(listener.clone() as Arc<dyn GatewayListener>));
        let gateway = VirtualGateway::new(weak, &config("{}"));

        let order = testutil::order(9, 10);
        assert!(gateway.send_order(&order.req));

        wait_until(|| !listener.traded.lock().unwrap().is_empty());
        let accepted = listener.accepted.lock().unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].engine_order_id, 9);
        let traded = listener.traded.lock().unwrap();
        assert_eq!(traded[0].volume, 10);
        assert_eq!(traded[0].price, 100.0);
    }

    #[test]
    fn resting_mode_cancels_cleanly() {
        let listener = Arc::new(RecordingListener::default());
        let weak: Weak<dyn GatewayListener> = Arc::downgrade(&(listener.clone() as Arc<dyn GatewayListener>));
        let gateway = VirtualGateway::new(weak, &config(r#"{"fill_mode": "resting"}"#));

        let order = testutil::order(9, 10);
        gateway.send_order(&order.req);
        wait_until(|| !listener.accepted.lock().unwrap().is_empty());
        let broker_id = listener.accepted.lock().unwrap()[0].order_id;

        gateway.cancel_order(broker_id);
        wait_until(|| !listener.canceled.lock().unwrap().is_empty());
        let canceled = listener.canceled.lock().unwrap();
        assert_eq!(canceled[0].engine_order_id, 9);
        assert_eq!(canceled[0].canceled_volume, 10);

        gateway.cancel_order(777);
        wait_until(|| !listener.cancel_rejected.lock().unwrap().is_empty());
    }

    #[test]
    fn query_account_reports_configured_balance() {
        let listener = Arc::new(RecordingListener::default());
        let weak: Weak<dyn GatewayListener> = Arc::downgrade(&(listener.clone() as Arc<dyn GatewayListener>));
        let gateway = VirtualGateway::new(weak, &config(r#"{"initial_balance": 5000.0}"#));

        gateway.query_account();
        wait_until(|| !listener.accounts.lock().unwrap().is_empty());
        assert_eq!(listener.accounts.lock().unwrap()[0].balance, 5000.0);
    }
}
