//! Command framing.
//!
//! Every command travels as one fixed-size little-endian frame so the ring
//! buffer can treat the channel as an array of equal slots and the bus can
//! forward the bytes verbatim. Producers and the consumer share this build;
//! the frame constants below are the single source of truth for the layout.

use std::fmt;

use thiserror::Error;

/// Sanity marker at offset 0 of every frame.
pub const COMMAND_MAGIC: u32 = 0x0170_9394;

/// Total frame size. Header is 24 bytes (magic, kind, strategy id); the
/// remaining 40 bytes are the payload slot, zero-padded per kind.
pub const COMMAND_FRAME_LEN: usize = 64;

const PAYLOAD_OFF: usize = 24;

const KIND_NEW_ORDER: u32 = 1;
const KIND_CANCEL_ORDER: u32 = 2;
const KIND_CANCEL_TICKER: u32 = 3;
const KIND_CANCEL_ALL: u32 = 4;

/// Frame-level decode failures. Each one is a per-record failure: the
/// consumer logs and drops, it never aborts the channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad magic {found:#x}, expected {COMMAND_MAGIC:#x}")]
    BadMagic { found: u32 },

    #[error("unknown command kind {0}")]
    UnknownKind(u32),

    #[error("invalid {field} value {value}")]
    BadEnum { field: &'static str, value: u32 },

    #[error("frame truncated: {len} bytes, need {need}")]
    Truncated { len: usize, need: usize },
}

/// 16-byte null-padded ASCII identifier echoed back on every response so a
/// strategy can pick its own orders out of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StrategyId([u8; 16]);

impl StrategyId {
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let n = bytes.len().min(16);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(buf)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(16);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Direction {
    Buy = 0,
    Sell = 1,
}

impl Direction {
    /// The side an opposing resting order would have.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }
}

impl TryFrom<u32> for Direction {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(Direction::Buy),
            1 => Ok(Direction::Sell),
            _ => Err(FrameError::BadEnum {
                field: "direction",
                value,
            }),
        }
    }
}

/// Open/close semantics of Chinese futures markets. Which leg of a position
/// an order touches depends on this, not on the direction alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OrderOffset {
    Open = 0,
    Close = 1,
    CloseToday = 2,
    CloseYesterday = 3,
}

impl OrderOffset {
    pub fn is_close(self) -> bool {
        !matches!(self, OrderOffset::Open)
    }
}

impl TryFrom<u32> for OrderOffset {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(OrderOffset::Open),
            1 => Ok(OrderOffset::Close),
            2 => Ok(OrderOffset::CloseToday),
            3 => Ok(OrderOffset::CloseYesterday),
            _ => Err(FrameError::BadEnum {
                field: "offset",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OrderType {
    Limit = 0,
    Market = 1,
    /// Best price on the own side of the book.
    Best = 2,
    /// Fill-and-kill: fill what is immediately available, cancel the rest.
    Fak = 3,
    /// Fill-or-kill: fill entirely or cancel entirely.
    Fok = 4,
}

impl OrderType {
    /// Market-style orders carry no meaningful price.
    pub fn carries_price(self) -> bool {
        !matches!(self, OrderType::Market | OrderType::Best)
    }
}

impl TryFrom<u32> for OrderType {
    type Error = FrameError;

    fn try_from(value: u32) -> Result<Self, FrameError> {
        match value {
            0 => Ok(OrderType::Limit),
            1 => Ok(OrderType::Market),
            2 => Ok(OrderType::Best),
            3 => Ok(OrderType::Fak),
            4 => Ok(OrderType::Fok),
            _ => Err(FrameError::BadEnum {
                field: "order_type",
                value,
            }),
        }
    }
}

/// Payload of a new-order command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderCommand {
    pub user_order_id: u32,
    pub ticker_index: u32,
    pub direction: Direction,
    pub offset: OrderOffset,
    pub order_type: OrderType,
    pub volume: i32,
    pub price: f64,
    /// Opaque gateway flags, forwarded untouched.
    pub flags: u32,
    /// Bypass the risk chain. Emergency hatch only.
    pub without_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandBody {
    NewOrder(OrderCommand),
    CancelOrder { engine_order_id: u64 },
    CancelTicker { ticker_index: u32 },
    CancelAll,
}

impl CommandBody {
    fn kind(&self) -> u32 {
        match self {
            CommandBody::NewOrder(_) => KIND_NEW_ORDER,
            CommandBody::CancelOrder { .. } => KIND_CANCEL_ORDER,
            CommandBody::CancelTicker { .. } => KIND_CANCEL_TICKER,
            CommandBody::CancelAll => KIND_CANCEL_ALL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraderCommand {
    pub strategy_id: StrategyId,
    pub body: CommandBody,
}

impl TraderCommand {
    pub fn encode(&self) -> [u8; COMMAND_FRAME_LEN] {
        let mut buf = [0u8; COMMAND_FRAME_LEN];
        buf[0..4].copy_from_slice(&COMMAND_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.body.kind().to_le_bytes());
        buf[8..24].copy_from_slice(self.strategy_id.as_bytes());

        let p = PAYLOAD_OFF;
        match self.body {
            CommandBody::NewOrder(req) => {
                buf[p..p + 4].copy_from_slice(&req.user_order_id.to_le_bytes());
                buf[p + 4..p + 8].copy_from_slice(&req.ticker_index.to_le_bytes());
                buf[p + 8..p + 12].copy_from_slice(&(req.direction as u32).to_le_bytes());
                buf[p + 12..p + 16].copy_from_slice(&(req.offset as u32).to_le_bytes());
                buf[p + 16..p + 20].copy_from_slice(&(req.order_type as u32).to_le_bytes());
                buf[p + 20..p + 24].copy_from_slice(&req.volume.to_le_bytes());
                buf[p + 24..p + 32].copy_from_slice(&req.price.to_le_bytes());
                buf[p + 32..p + 36].copy_from_slice(&req.flags.to_le_bytes());
                buf[p + 36] = req.without_check as u8;
            }
            CommandBody::CancelOrder { engine_order_id } => {
                buf[p..p + 8].copy_from_slice(&engine_order_id.to_le_bytes());
            }
            CommandBody::CancelTicker { ticker_index } => {
                buf[p..p + 4].copy_from_slice(&ticker_index.to_le_bytes());
            }
            CommandBody::CancelAll => {}
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < COMMAND_FRAME_LEN {
            return Err(FrameError::Truncated {
                len: buf.len(),
                need: COMMAND_FRAME_LEN,
            });
        }
        let magic = read_u32(buf, 0);
        if magic != COMMAND_MAGIC {
            return Err(FrameError::BadMagic { found: magic });
        }
        let kind = read_u32(buf, 4);
        let mut id = [0u8; 16];
        id.copy_from_slice(&buf[8..24]);
        let strategy_id = StrategyId::from_bytes(id);

        let p = PAYLOAD_OFF;
        let body = match kind {
            KIND_NEW_ORDER => CommandBody::NewOrder(OrderCommand {
                user_order_id: read_u32(buf, p),
                ticker_index: read_u32(buf, p + 4),
                direction: Direction::try_from(read_u32(buf, p + 8))?,
                offset: OrderOffset::try_from(read_u32(buf, p + 12))?,
                order_type: OrderType::try_from(read_u32(buf, p + 16))?,
                volume: read_i32(buf, p + 20),
                price: f64::from_le_bytes(buf[p + 24..p + 32].try_into().unwrap()),
                flags: read_u32(buf, p + 32),
                without_check: buf[p + 36] != 0,
            }),
            KIND_CANCEL_ORDER => CommandBody::CancelOrder {
                engine_order_id: u64::from_le_bytes(buf[p..p + 8].try_into().unwrap()),
            },
            KIND_CANCEL_TICKER => CommandBody::CancelTicker {
                ticker_index: read_u32(buf, p),
            },
            KIND_CANCEL_ALL => CommandBody::CancelAll,
            other => return Err(FrameError::UnknownKind(other)),
        };

        Ok(Self { strategy_id, body })
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn read_i32(buf: &[u8], off: usize) -> i32 {
    i32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_order_cmd() -> TraderCommand {
        TraderCommand {
            strategy_id: StrategyId::new("grid-01"),
            body: CommandBody::NewOrder(OrderCommand {
                user_order_id: 42,
                ticker_index: 7,
                direction: Direction::Buy,
                offset: OrderOffset::Open,
                order_type: OrderType::Limit,
                volume: 10,
                price: 100.25,
                flags: 0x5,
                without_check: false,
            }),
        }
    }

    #[test]
    fn round_trip_new_order() {
        let cmd = new_order_cmd();
        let decoded = TraderCommand::decode(&cmd.encode()).unwrap();
        assert_eq!(decoded, cmd);
        assert_eq!(decoded.strategy_id.as_str(), "grid-01");
    }

    #[test]
    fn round_trip_cancel_variants() {
        for body in [
            CommandBody::CancelOrder {
                engine_order_id: u64::MAX - 3,
            },
            CommandBody::CancelTicker { ticker_index: 9001 },
            CommandBody::CancelAll,
        ] {
            let cmd = TraderCommand {
                strategy_id: StrategyId::new("x"),
                body,
            };
            assert_eq!(TraderCommand::decode(&cmd.encode()).unwrap(), cmd);
        }
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = new_order_cmd().encode();
        buf[0] ^= 0xff;
        assert!(matches!(
            TraderCommand::decode(&buf),
            Err(FrameError::BadMagic { .. })
        ));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut buf = new_order_cmd().encode();
        buf[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(
            TraderCommand::decode(&buf),
            Err(FrameError::UnknownKind(99))
        );
    }

    #[test]
    fn bad_direction_is_rejected() {
        let mut buf = new_order_cmd().encode();
        buf[PAYLOAD_OFF + 8..PAYLOAD_OFF + 12].copy_from_slice(&7u32.to_le_bytes());
        assert_eq!(
            TraderCommand::decode(&buf),
            Err(FrameError::BadEnum {
                field: "direction",
                value: 7
            })
        );
    }

    #[test]
    fn truncated_frame_is_rejected() {
        let buf = new_order_cmd().encode();
        assert_eq!(
            TraderCommand::decode(&buf[..10]),
            Err(FrameError::Truncated {
                len: 10,
                need: COMMAND_FRAME_LEN
            })
        );
    }

    #[test]
    fn strategy_id_pads_and_truncates() {
        assert_eq!(StrategyId::new("abc").as_str(), "abc");
        let long = StrategyId::new("0123456789abcdef-overflow");
        assert_eq!(long.as_str(), "0123456789abcdef");
    }
}
