//! Order book aggregation and display windowing
//!
//! Turns raw depth snapshots into a bounded, stable display structure:
//! levels are bucketed to the price grid and filtered to a window around a
//! sticky anchor price. The anchor only re-centers when the true midpoint
//! has drifted far enough, so the visible ladder does not jitter on every
//! tick. `midpoint` and `spread` are always computed from the full,
//! unfiltered book.

use serde::Serialize;

use crate::config::BookConfig;
use crate::connection::{BookSnapshot, PriceLevel};

/// Derived display state for one depth snapshot. Rebuilt wholesale on
/// every update; consumers only ever read it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderBookView {
    /// Bucketed bid levels inside the window, descending price
    pub bids: Vec<PriceLevel>,
    /// Bucketed ask levels inside the window, ascending price
    pub asks: Vec<PriceLevel>,
    /// Stabilized window center
    pub anchor: f64,
    /// True midpoint of the unfiltered book (0 when a side is empty)
    pub midpoint: f64,
    /// Best-ask minus best-bid of the unfiltered book (0 when a side is empty)
    pub spread: f64,
}

pub struct OrderBookAggregator {
    config: BookConfig,
    anchor: f64,
    /// False until a positive midpoint has been observed; until then the
    /// anchor holds at the configured default price
    anchored: bool,
}

impl OrderBookAggregator {
    pub fn new(config: BookConfig) -> Self {
        let anchor = config.default_price;
        Self {
            config,
            anchor,
            anchored: false,
        }
    }

    pub fn anchor(&self) -> f64 {
        self.anchor
    }

    /// Clear per-market state (new market / logout).
    pub fn reset(&mut self) {
        self.anchor = self.config.default_price;
        self.anchored = false;
    }

    /// Apply a full depth snapshot and derive the display view.
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) -> OrderBookView {
        let midpoint = real_midpoint(&snapshot.bids, &snapshot.asks);
        let spread = real_spread(&snapshot.bids, &snapshot.asks);

        self.update_anchor(midpoint);

        let half_width = self.config.depth as f64 * self.config.step;
        let lo = self.anchor - half_width;
        let hi = self.anchor + half_width;

        let mut bids = bucket_levels(&snapshot.bids, self.config.step);
        bids.retain(|l| l.price >= lo && l.price <= hi);
        bids.sort_by(|a, b| b.price.total_cmp(&a.price));

        let mut asks = bucket_levels(&snapshot.asks, self.config.step);
        asks.retain(|l| l.price >= lo && l.price <= hi);
        asks.sort_by(|a, b| a.price.total_cmp(&b.price));

        OrderBookView {
            bids,
            asks,
            anchor: self.anchor,
            midpoint,
            spread,
        }
    }

    fn update_anchor(&mut self, midpoint: f64) {
        if !self.anchored {
            if midpoint > 0.0 {
                self.anchor = round_to_step(midpoint, self.config.step);
                self.anchored = true;
            }
            return;
        }

        if midpoint > 0.0 && (midpoint - self.anchor).abs() >= self.config.adjustment_threshold {
            let new_anchor = round_to_step(midpoint, self.config.step);
            tracing::debug!(
                old = self.anchor,
                new = new_anchor,
                midpoint,
                "anchor re-centered"
            );
            self.anchor = new_anchor;
        }
    }
}

/// True midpoint of the unfiltered book: (max bid + min ask) / 2,
/// or 0 when either side is empty.
pub fn real_midpoint(bids: &[PriceLevel], asks: &[PriceLevel]) -> f64 {
    match (best_bid(bids), best_ask(asks)) {
        (Some(bid), Some(ask)) => (bid + ask) / 2.0,
        _ => 0.0,
    }
}

fn real_spread(bids: &[PriceLevel], asks: &[PriceLevel]) -> f64 {
    match (best_bid(bids), best_ask(asks)) {
        (Some(bid), Some(ask)) => ask - bid,
        _ => 0.0,
    }
}

fn best_bid(bids: &[PriceLevel]) -> Option<f64> {
    bids.iter().map(|l| l.price).reduce(f64::max)
}

fn best_ask(asks: &[PriceLevel]) -> Option<f64> {
    asks.iter().map(|l| l.price).reduce(f64::min)
}

fn round_to_step(price: f64, step: f64) -> f64 {
    (price / step).round() * step
}

/// Sum quantities into buckets on the price grid.
fn bucket_levels(levels: &[PriceLevel], step: f64) -> Vec<PriceLevel> {
    let mut out: Vec<PriceLevel> = Vec::with_capacity(levels.len());
    for level in levels {
        let bucket = round_to_step(level.price, step);
        match out.iter_mut().find(|l| l.price == bucket) {
            Some(existing) => existing.quantity += level.quantity,
            None => out.push(PriceLevel::new(bucket, level.quantity)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels(pairs: &[(f64, f64)]) -> Vec<PriceLevel> {
        pairs.iter().map(|&(p, q)| PriceLevel::new(p, q)).collect()
    }

    fn snapshot(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> BookSnapshot {
        BookSnapshot {
            bids: levels(bids),
            asks: levels(asks),
        }
    }

    fn config() -> BookConfig {
        BookConfig {
            depth: 3,
            step: 1.0,
            adjustment_threshold: 2.0,
            default_price: 100.0,
        }
    }

    #[test]
    fn test_midpoint_from_unfiltered_book() {
        let bids = levels(&[(98.0, 1.0), (100.0, 2.0), (99.0, 1.0)]);
        let asks = levels(&[(103.0, 1.0), (102.0, 1.0)]);
        assert_eq!(real_midpoint(&bids, &asks), 101.0);
    }

    #[test]
    fn test_midpoint_zero_when_side_empty() {
        let bids = levels(&[(100.0, 1.0)]);
        assert_eq!(real_midpoint(&bids, &[]), 0.0);
        assert_eq!(real_midpoint(&[], &bids), 0.0);
        assert_eq!(real_midpoint(&[], &[]), 0.0);
    }

    #[test]
    fn test_spread_from_unfiltered_book() {
        let mut agg = OrderBookAggregator::new(config());
        let view = agg.apply_snapshot(&snapshot(&[(100.0, 1.0)], &[(102.0, 1.0)]));
        assert_eq!(view.spread, 2.0);
        assert_eq!(view.midpoint, 101.0);
    }

    #[test]
    fn test_anchor_seeds_from_first_positive_midpoint() {
        let mut agg = OrderBookAggregator::new(config());
        // Empty book: anchor holds at default
        let view = agg.apply_snapshot(&BookSnapshot::default());
        assert_eq!(view.anchor, 100.0);
        // First positive midpoint seeds the anchor
        let view = agg.apply_snapshot(&snapshot(&[(104.0, 1.0)], &[(107.0, 1.0)]));
        assert_eq!(view.anchor, 105.5_f64.round());
    }

    #[test]
    fn test_anchor_holds_below_threshold() {
        let mut agg = OrderBookAggregator::new(config());
        agg.apply_snapshot(&snapshot(&[(99.0, 1.0)], &[(101.0, 1.0)])); // anchor 100
        assert_eq!(agg.anchor(), 100.0);

        // Midpoints drifting by < threshold (2.0) never move the anchor
        for (bid, ask) in [(99.5, 101.5), (100.0, 102.0), (98.5, 100.5)] {
            let view = agg.apply_snapshot(&snapshot(&[(bid, 1.0)], &[(ask, 1.0)]));
            assert_eq!(view.anchor, 100.0, "bid {} ask {}", bid, ask);
        }
    }

    #[test]
    fn test_anchor_jumps_to_rounded_midpoint_at_threshold() {
        let mut agg = OrderBookAggregator::new(config());
        agg.apply_snapshot(&snapshot(&[(99.0, 1.0)], &[(101.0, 1.0)])); // anchor 100

        // Midpoint 102.5 drifts by 2.5 >= threshold: anchor jumps, rounded
        let view = agg.apply_snapshot(&snapshot(&[(102.0, 1.0)], &[(103.0, 1.0)]));
        assert_eq!(view.anchor, 103.0); // round(102.5) on a 1.0 grid
    }

    #[test]
    fn test_window_bounds_and_ordering() {
        let mut agg = OrderBookAggregator::new(config());
        let view = agg.apply_snapshot(&snapshot(
            &[(95.0, 1.0), (99.0, 2.0), (98.0, 1.0), (100.0, 3.0)],
            &[(101.0, 1.0), (103.0, 2.0), (108.0, 5.0)],
        ));
        // anchor seeds at round((100+101)/2) = 101, window [98, 104]
        assert_eq!(view.anchor, 101.0);
        for level in view.bids.iter().chain(view.asks.iter()) {
            assert!(level.price >= 98.0 && level.price <= 104.0, "{:?}", level);
        }
        // 95 bid and 108 ask filtered out of the display
        assert!(view.bids.iter().all(|l| l.price != 95.0));
        assert!(view.asks.iter().all(|l| l.price != 108.0));
        // bids descending, asks ascending
        assert!(view.bids.windows(2).all(|w| w[0].price > w[1].price));
        assert!(view.asks.windows(2).all(|w| w[0].price < w[1].price));
        // midpoint still from the unfiltered book
        assert_eq!(view.midpoint, 100.5);
    }

    #[test]
    fn test_levels_bucketed_on_grid() {
        let mut agg = OrderBookAggregator::new(config());
        let view = agg.apply_snapshot(&snapshot(
            &[(99.8, 2.0), (100.1, 3.0), (100.2, 1.0)],
            &[(101.7, 4.0)],
        ));
        let bucket_100 = view.bids.iter().find(|l| l.price == 100.0).unwrap();
        assert_eq!(bucket_100.quantity, 6.0);
        let bucket_102 = view.asks.iter().find(|l| l.price == 102.0).unwrap();
        assert_eq!(bucket_102.quantity, 4.0);
    }

    #[test]
    fn test_reset_rearms_anchor() {
        let mut agg = OrderBookAggregator::new(config());
        agg.apply_snapshot(&snapshot(&[(119.0, 1.0)], &[(121.0, 1.0)]));
        assert_eq!(agg.anchor(), 120.0);
        agg.reset();
        assert_eq!(agg.anchor(), 100.0);
        // Re-seeds from the next positive midpoint
        agg.apply_snapshot(&snapshot(&[(89.0, 1.0)], &[(91.0, 1.0)]));
        assert_eq!(agg.anchor(), 90.0);
    }
}
