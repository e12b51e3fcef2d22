//! Order-response framing (engine → strategies).
//!
//! One packed little-endian record per lifecycle event. `user_order_id` is
//! the strategy's own id echoed back; `order_id` is the broker id once
//! assigned (0 before acceptance).

use crate::command::{Direction, FrameError, OrderOffset};

pub const RESPONSE_FRAME_LEN: usize = 49;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderResponse {
    pub user_order_id: u32,
    pub order_id: u64,
    pub ticker_index: u32,
    pub direction: Direction,
    pub offset: OrderOffset,
    pub original_volume: i32,
    pub traded_volume: i32,
    pub completed: bool,
    pub error_code: i32,
    pub this_traded: u32,
    pub this_traded_price: f64,
}

impl OrderResponse {
    pub fn encode(&self) -> [u8; RESPONSE_FRAME_LEN] {
        let mut buf = [0u8; RESPONSE_FRAME_LEN];
        buf[0..4].copy_from_slice(&self.user_order_id.to_le_bytes());
        buf[4..12].copy_from_slice(&self.order_id.to_le_bytes());
        buf[12..16].copy_from_slice(&self.ticker_index.to_le_bytes());
        buf[16..20].copy_from_slice(&(self.direction as u32).to_le_bytes());
        buf[20..24].copy_from_slice(&(self.offset as u32).to_le_bytes());
        buf[24..28].copy_from_slice(&self.original_volume.to_le_bytes());
        buf[28..32].copy_from_slice(&self.traded_volume.to_le_bytes());
        buf[32] = self.completed as u8;
        buf[33..37].copy_from_slice(&self.error_code.to_le_bytes());
        buf[37..41].copy_from_slice(&self.this_traded.to_le_bytes());
        buf[41..49].copy_from_slice(&self.this_traded_price.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < RESPONSE_FRAME_LEN {
            return Err(FrameError::Truncated {
                len: buf.len(),
                need: RESPONSE_FRAME_LEN,
            });
        }
        Ok(Self {
            user_order_id: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            order_id: u64::from_le_bytes(buf[4..12].try_into().unwrap()),
            ticker_index: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
            direction: Direction::try_from(u32::from_le_bytes(buf[16..20].try_into().unwrap()))?,
            offset: OrderOffset::try_from(u32::from_le_bytes(buf[20..24].try_into().unwrap()))?,
            original_volume: i32::from_le_bytes(buf[24..28].try_into().unwrap()),
            traded_volume: i32::from_le_bytes(buf[28..32].try_into().unwrap()),
            completed: buf[32] != 0,
            error_code: i32::from_le_bytes(buf[33..37].try_into().unwrap()),
            this_traded: u32::from_le_bytes(buf[37..41].try_into().unwrap()),
            this_traded_price: f64::from_le_bytes(buf[41..49].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let rsp = OrderResponse {
            user_order_id: 11,
            order_id: 555_000_001,
            ticker_index: 7,
            direction: Direction::Sell,
            offset: OrderOffset::CloseYesterday,
            original_volume: 10,
            traded_volume: 4,
            completed: false,
            error_code: 0,
            this_traded: 4,
            this_traded_price: 99.5,
        };
        assert_eq!(OrderResponse::decode(&rsp.encode()).unwrap(), rsp);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let rsp = OrderResponse {
            user_order_id: 0,
            order_id: 0,
            ticker_index: 0,
            direction: Direction::Buy,
            offset: OrderOffset::Open,
            original_volume: 1,
            traded_volume: 0,
            completed: false,
            error_code: 0,
            this_traded: 0,
            this_traded_price: 0.0,
        };
        let buf = rsp.encode();
        assert!(OrderResponse::decode(&buf[..RESPONSE_FRAME_LEN - 1]).is_err());
    }
}
