//! Pub/sub fallback transport.
//!
//! Used when no shared-memory key is configured. The engine binds a SUB
//! socket and subscribes to its account's topic; any number of strategy
//! processes connect PUB sockets and publish command frames. The payload
//! bytes are identical to the ring's frames.

use std::sync::Mutex;

use log::error;

use crate::command::{TraderCommand, COMMAND_FRAME_LEN};

/// Topic carrying commands for one trading account.
pub fn command_topic(account_id: u64) -> String {
    format!("trader-cmd-{account_id}")
}

/// Producer side. Shared across strategy threads behind a mutex because zmq
/// sockets are not thread-safe.
pub struct CommandBusPublisher {
    socket: Mutex<zmq::Socket>,
    topic: String,
}

impl CommandBusPublisher {
    pub fn connect(endpoint: &str, account_id: u64) -> Result<Self, zmq::Error> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB)?;
        socket.connect(endpoint)?;
        Ok(Self {
            socket: Mutex::new(socket),
            topic: command_topic(account_id),
        })
    }

    pub fn publish(&self, cmd: &TraderCommand) -> Result<(), zmq::Error> {
        let frame = cmd.encode();
        let socket = self.socket.lock().unwrap();
        socket.send(self.topic.as_bytes(), zmq::SNDMORE)?;
        socket.send(&frame[..], 0)
    }
}

/// Consumer side, owned by the engine's dispatch thread.
pub struct CommandBusPuller {
    socket: zmq::Socket,
    topic: String,
}

impl CommandBusPuller {
    pub fn bind(endpoint: &str, account_id: u64) -> Result<Self, zmq::Error> {
        let context = zmq::Context::new();
        let socket = context.socket(zmq::SUB)?;
        socket.bind(endpoint)?;
        let topic = command_topic(account_id);
        socket.set_subscribe(topic.as_bytes())?;
        Ok(Self { socket, topic })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Block until the next well-formed command. Malformed records are
    /// dropped with an error log and surface as `None` so the caller's loop
    /// simply continues.
    pub fn pull(&self) -> Option<TraderCommand> {
        let topic = match self.socket.recv_bytes(0) {
            Ok(t) => t,
            Err(e) => {
                error!("command bus recv failed: {e}");
                return None;
            }
        };
        if topic != self.topic.as_bytes() {
            error!("command bus: unexpected topic frame");
            return None;
        }
        if !self.socket.get_rcvmore().unwrap_or(false) {
            error!("command bus: topic frame without payload");
            return None;
        }
        let payload = match self.socket.recv_bytes(0) {
            Ok(p) => p,
            Err(e) => {
                error!("command bus recv failed: {e}");
                return None;
            }
        };
        if payload.len() != COMMAND_FRAME_LEN {
            error!(
                "command bus: dropping {}-byte frame, expected {COMMAND_FRAME_LEN}",
                payload.len()
            );
            return None;
        }
        match TraderCommand::decode(&payload) {
            Ok(cmd) => Some(cmd),
            Err(e) => {
                error!("command bus: dropping malformed frame: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_is_account_scoped() {
        assert_eq!(command_topic(8801), "trader-cmd-8801");
        assert_ne!(command_topic(1), command_topic(2));
    }
}
