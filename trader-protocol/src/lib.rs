//! Wire contract between strategy processes and the trading engine.
//!
//! Strategies link this crate to push `TraderCommand`s; the engine links it
//! to consume them. Two interchangeable transports carry the same fixed-size
//! frame: a shared-memory ring buffer (primary) and a zmq pub/sub topic
//! (fallback).

pub mod bus;
pub mod client;
pub mod command;
pub mod response;
pub mod ring;

pub use bus::{command_topic, CommandBusPublisher, CommandBusPuller};
pub use client::CommandSender;
pub use command::{
    CommandBody, Direction, FrameError, OrderCommand, OrderOffset, OrderType, StrategyId,
    TraderCommand, COMMAND_FRAME_LEN, COMMAND_MAGIC,
};
pub use response::{OrderResponse, RESPONSE_FRAME_LEN};
pub use ring::{CommandRing, RingError, DEFAULT_RING_CAPACITY};

use thiserror::Error;

/// Failures a producer can hit while handing a command to either transport.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("ring error: {0}")]
    Ring(#[from] RingError),

    #[error("bus error: {0}")]
    Bus(#[from] zmq::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}
