use std::sync::Mutex;

use log::error;
use trader_protocol::OrderResponse;

/// Publishes order responses back to strategies. Best effort: a send
/// failure is logged, never surfaced — the engine's own state does not
/// depend on anyone listening.
pub struct ResponsePublisher {
    socket: Mutex<zmq::Socket>,
    topic: String,
}

impl ResponsePublisher {
    pub fn bind(endpoint: &str, account_id: u64) -> Result<Self, zmq::Error> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB)?;
        socket.bind(endpoint)?;
        Ok(Self {
            socket: Mutex::new(socket),
            topic: format!("trader-rsp-{account_id}"),
        })
    }

    pub fn publish(&self, rsp: &OrderResponse) {
        let frame = rsp.encode();
        let socket = self.socket.lock().unwrap();
        if let Err(e) = socket
            .send(self.topic.as_bytes(), zmq::SNDMORE)
            .and_then(|_| socket.send(&frame[..], 0))
        {
            error!("failed to publish order response: {e}");
        }
    }
}
