//! Producer-side handle used by strategy processes.

use std::path::Path;

use crate::bus::CommandBusPublisher;
use crate::command::TraderCommand;
use crate::ring::CommandRing;
use crate::ProtocolError;

/// One handle, either transport. Strategies pick whichever the engine was
/// configured with and call `send` for every command.
pub enum CommandSender {
    Ring(CommandRing),
    Bus(CommandBusPublisher),
}

impl CommandSender {
    /// Attach to the engine's shared-memory ring. The owner tag must match
    /// the engine build that created the segment.
    pub fn ring(dir: &Path, key: u32, owner_tag: u32) -> Result<Self, ProtocolError> {
        Ok(Self::Ring(CommandRing::open(dir, key, owner_tag)?))
    }

    pub fn bus(endpoint: &str, account_id: u64) -> Result<Self, ProtocolError> {
        Ok(Self::Bus(CommandBusPublisher::connect(endpoint, account_id)?))
    }

    /// At-most-once delivery: a full ring surfaces as an error, it never
    /// blocks the strategy.
    pub fn send(&self, cmd: &TraderCommand) -> Result<(), ProtocolError> {
        match self {
            Self::Ring(ring) => ring.push(&cmd.encode()).map_err(ProtocolError::from),
            Self::Bus(publisher) => publisher.publish(cmd).map_err(ProtocolError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandBody, StrategyId};

    #[test]
    fn ring_sender_reaches_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let mut consumer = CommandRing::create(dir.path(), 11, 42, 8).unwrap();

        let sender = CommandSender::ring(dir.path(), 11, 42).unwrap();
        let cmd = TraderCommand {
            strategy_id: StrategyId::new("s1"),
            body: CommandBody::CancelAll,
        };
        sender.send(&cmd).unwrap();

        let mut out = [0u8; crate::COMMAND_FRAME_LEN];
        assert!(consumer.pop(&mut out));
        assert_eq!(TraderCommand::decode(&out).unwrap(), cmd);
    }

    #[test]
    fn ring_sender_rejects_wrong_owner() {
        let dir = tempfile::tempdir().unwrap();
        let _consumer = CommandRing::create(dir.path(), 12, 42, 8).unwrap();
        assert!(CommandSender::ring(dir.path(), 12, 43).is_err());
    }
}
