use std::collections::HashMap;

use serde::Deserialize;
use trader_protocol::{Direction, OrderOffset};

/// One leg (long or short) of a position.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PositionDetail {
    pub holdings: i32,
    /// Carryover from yesterday, closed with different fees on some venues.
    pub yd_holdings: i32,
    pub cost_price: f64,
    /// Volume reserved by not-yet-filled closing orders.
    pub frozen: i32,
    pub float_pnl: f64,
}

impl PositionDetail {
    pub fn is_empty(&self) -> bool {
        self.holdings == 0 && self.frozen == 0
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Position {
    pub ticker_index: u32,
    pub long: PositionDetail,
    pub short: PositionDetail,
}

impl Position {
    pub fn new(ticker_index: u32) -> Self {
        Self {
            ticker_index,
            ..Default::default()
        }
    }

    pub fn leg(&self, leg: Direction) -> &PositionDetail {
        match leg {
            Direction::Buy => &self.long,
            Direction::Sell => &self.short,
        }
    }

    fn leg_mut(&mut self, leg: Direction) -> &mut PositionDetail {
        match leg {
            Direction::Buy => &mut self.long,
            Direction::Sell => &mut self.short,
        }
    }
}

/// Which position leg a closing order releases: a sell closes the long leg,
/// a buy closes the short leg.
pub fn closing_leg(direction: Direction) -> Direction {
    direction.opposite()
}

/// Positions per ticker index. Rebuilt from gateway queries at login,
/// then maintained from live fills by the risk chain.
#[derive(Debug, Default)]
pub struct Portfolio {
    positions: HashMap<u32, Position>,
}

impl Portfolio {
    /// Replace a whole position (both legs) from a gateway query.
    pub fn set_position(&mut self, position: Position) {
        self.positions.insert(position.ticker_index, position);
    }

    pub fn position(&self, ticker_index: u32) -> Option<&Position> {
        self.positions.get(&ticker_index)
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, u32, Position> {
        self.positions.iter()
    }

    fn leg_mut(&mut self, ticker_index: u32, leg: Direction) -> &mut PositionDetail {
        self.positions
            .entry(ticker_index)
            .or_insert_with(|| Position::new(ticker_index))
            .leg_mut(leg)
    }

    /// Volume a closing order may still claim on the given leg.
    pub fn closable(&self, ticker_index: u32, leg: Direction, offset: OrderOffset) -> i32 {
        let Some(detail) = self.positions.get(&ticker_index).map(|p| p.leg(leg)) else {
            return 0;
        };
        let unfrozen = detail.holdings - detail.frozen;
        let limit = match offset {
            OrderOffset::CloseYesterday => unfrozen.min(detail.yd_holdings),
            OrderOffset::CloseToday => unfrozen.min(detail.holdings - detail.yd_holdings),
            _ => unfrozen,
        };
        limit.max(0)
    }

    pub fn freeze(&mut self, ticker_index: u32, leg: Direction, volume: i32) {
        self.leg_mut(ticker_index, leg).frozen += volume;
    }

    pub fn release(&mut self, ticker_index: u32, leg: Direction, volume: i32) {
        let detail = self.leg_mut(ticker_index, leg);
        detail.frozen = (detail.frozen - volume).max(0);
    }

    /// Apply one live fill. Opens grow the order's own leg and re-average
    /// its cost; closes shrink the opposite leg and consume the matching
    /// frozen reservation.
    pub fn apply_trade(
        &mut self,
        ticker_index: u32,
        direction: Direction,
        offset: OrderOffset,
        volume: i32,
        price: f64,
    ) {
        if offset == OrderOffset::Open {
            let detail = self.leg_mut(ticker_index, direction);
            let total = detail.holdings + volume;
            if total > 0 {
                detail.cost_price = (detail.cost_price * detail.holdings as f64
                    + price * volume as f64)
                    / total as f64;
            }
            detail.holdings = total;
        } else {
            let detail = self.leg_mut(ticker_index, closing_leg(direction));
            let fill = volume.min(detail.holdings).max(0);
            detail.holdings -= fill;
            detail.frozen = (detail.frozen - fill).max(0);
            match offset {
                OrderOffset::CloseYesterday => {
                    detail.yd_holdings = (detail.yd_holdings - fill).max(0);
                }
                OrderOffset::CloseToday => {}
                // Plain close consumes yesterday volume first.
                _ => {
                    let from_yd = detail.yd_holdings.min(fill);
                    detail.yd_holdings -= from_yd;
                }
            }
            if detail.yd_holdings > detail.holdings {
                detail.yd_holdings = detail.holdings;
            }
        }
    }

    /// Replay-safe incremental update used only while replaying the day's
    /// trades during startup. No price, no freeze bookkeeping.
    pub fn update_on_query_trade(
        &mut self,
        ticker_index: u32,
        direction: Direction,
        offset: OrderOffset,
        volume: i32,
    ) {
        if offset == OrderOffset::Open {
            self.leg_mut(ticker_index, direction).holdings += volume;
        } else {
            let detail = self.leg_mut(ticker_index, closing_leg(direction));
            let fill = volume.min(detail.holdings).max(0);
            detail.holdings -= fill;
            match offset {
                OrderOffset::CloseYesterday => {
                    detail.yd_holdings = (detail.yd_holdings - fill).max(0);
                }
                OrderOffset::CloseToday => {}
                _ => {
                    let from_yd = detail.yd_holdings.min(fill);
                    detail.yd_holdings -= from_yd;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Portfolio {
        let mut portfolio = Portfolio::default();
        portfolio.set_position(Position {
            ticker_index: 7,
            long: PositionDetail {
                holdings: 10,
                yd_holdings: 4,
                cost_price: 95.0,
                frozen: 0,
                float_pnl: 0.0,
            },
            short: PositionDetail::default(),
        });
        portfolio
    }

    #[test]
    fn closable_respects_offsets_and_freezes() {
        let mut portfolio = seeded();
        assert_eq!(portfolio.closable(7, Direction::Buy, OrderOffset::Close), 10);
        assert_eq!(
            portfolio.closable(7, Direction::Buy, OrderOffset::CloseYesterday),
            4
        );
        assert_eq!(
            portfolio.closable(7, Direction::Buy, OrderOffset::CloseToday),
            6
        );

        portfolio.freeze(7, Direction::Buy, 8);
        assert_eq!(portfolio.closable(7, Direction::Buy, OrderOffset::Close), 2);
        assert_eq!(
            portfolio.closable(7, Direction::Buy, OrderOffset::CloseYesterday),
            2
        );

        assert_eq!(portfolio.closable(9, Direction::Buy, OrderOffset::Close), 0);
    }

    #[test]
    fn open_fill_averages_cost() {
        let mut portfolio = seeded();
        portfolio.apply_trade(7, Direction::Buy, OrderOffset::Open, 10, 105.0);
        let leg = portfolio.position(7).unwrap().leg(Direction::Buy);
        assert_eq!(leg.holdings, 20);
        assert!((leg.cost_price - 100.0).abs() < 1e-9);
    }

    #[test]
    fn sell_close_consumes_long_yd_first() {
        let mut portfolio = seeded();
        portfolio.freeze(7, Direction::Buy, 6);
        portfolio.apply_trade(7, Direction::Sell, OrderOffset::Close, 6, 100.0);
        let leg = portfolio.position(7).unwrap().leg(Direction::Buy);
        assert_eq!(leg.holdings, 4);
        assert_eq!(leg.yd_holdings, 0);
        assert_eq!(leg.frozen, 0);
    }

    #[test]
    fn close_today_leaves_yd_untouched() {
        let mut portfolio = seeded();
        portfolio.apply_trade(7, Direction::Sell, OrderOffset::CloseToday, 5, 100.0);
        let leg = portfolio.position(7).unwrap().leg(Direction::Buy);
        assert_eq!(leg.holdings, 5);
        assert_eq!(leg.yd_holdings, 4);
    }

    #[test]
    fn startup_replay_rebuilds_holdings() {
        let mut portfolio = Portfolio::default();
        portfolio.update_on_query_trade(3, Direction::Buy, OrderOffset::Open, 8);
        portfolio.update_on_query_trade(3, Direction::Sell, OrderOffset::Close, 2);
        let leg = portfolio.position(3).unwrap().leg(Direction::Buy);
        assert_eq!(leg.holdings, 6);
    }
}
