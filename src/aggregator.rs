//! Tick-to-bar aggregation and exchange-candle pass-through.
//!
//! Exactly one in-progress bar exists at a time; the aggregator owns and
//! mutates it until a timeframe boundary is crossed, after which it is frozen
//! and handed back, never to be touched again.

use crate::config::Timeframe;
use crate::events::{Bar, Tick};
use crate::okx::protocol::CandleData;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

pub struct BarAggregator {
    timeframe_ms: i64,
    current: Option<Bar>,
    last_completed_open_ms: Option<i64>,
}

impl BarAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe_ms: timeframe.millis(),
            current: None,
            last_completed_open_ms: None,
        }
    }

    /// The in-progress bar, if any tick or candle has been seen yet.
    pub fn current(&self) -> Option<&Bar> {
        self.current.as_ref()
    }

    fn align(&self, ts_ms: i64) -> i64 {
        (ts_ms / self.timeframe_ms) * self.timeframe_ms
    }

    fn ms_to_utc(ms: i64) -> DateTime<Utc> {
        // Aligned open times are always in range for chrono.
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn new_bar(&self, open_ms: i64, price: f64, volume: f64) -> Bar {
        Bar {
            open_time: Self::ms_to_utc(open_ms),
            close_time: Self::ms_to_utc(open_ms + self.timeframe_ms),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            complete: false,
        }
    }

    /// Fold a tick into the in-progress bar. Returns the completed bar when
    /// wall clock has crossed the bar's closing boundary.
    ///
    /// The first tick after startup seeds the initial bar at the timeframe
    /// floor of wall-clock time, not the tick's own timestamp, so open times
    /// stay boundary-aligned. A gap spanning several boundaries still closes
    /// exactly one bar, carrying stale OHLC for the skipped interval; the
    /// successor opens at `previous.open_time + timeframe`.
    pub fn on_tick(&mut self, tick: &Tick, now: DateTime<Utc>) -> Option<Bar> {
        let price = tick.price;
        if !(price > 0.0) {
            debug!(price, "ignoring tick with non-positive price");
            return None;
        }
        let now_ms = now.timestamp_millis();

        match &mut self.current {
            None => {
                let open_ms = self.align(now_ms);
                self.current = Some(self.new_bar(open_ms, price, tick.volume));
                None
            }
            Some(bar) => {
                let close_ms = bar.open_time_ms() + self.timeframe_ms;
                if now_ms >= close_ms {
                    let mut done = *bar;
                    done.complete = true;
                    self.last_completed_open_ms = Some(done.open_time_ms());
                    self.current = Some(self.new_bar(close_ms, price, tick.volume));
                    Some(done)
                } else {
                    bar.high = bar.high.max(price);
                    bar.low = bar.low.min(price);
                    bar.close = price;
                    bar.volume += tick.volume;
                    None
                }
            }
        }
    }

    /// Pass one exchange-aggregated candle update through. The current open
    /// candle is refreshed in place; a push with a newer open time freezes it
    /// and returns it as complete. Misaligned, duplicate and out-of-order
    /// pushes are dropped.
    pub fn on_candle(&mut self, candle: &CandleData) -> Option<Bar> {
        let open_ms = candle.ts.timestamp_millis();
        if open_ms % self.timeframe_ms != 0 {
            warn!(
                open_ms,
                timeframe_ms = self.timeframe_ms,
                "rejecting candle not aligned to timeframe boundary"
            );
            return None;
        }
        if let Some(last) = self.last_completed_open_ms {
            if open_ms <= last {
                debug!(open_ms, "dropping duplicate or out-of-order candle");
                return None;
            }
        }

        let incoming = Bar {
            open_time: Self::ms_to_utc(open_ms),
            close_time: Self::ms_to_utc(open_ms + self.timeframe_ms),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            complete: false,
        };

        match self.current {
            None => {
                self.current = Some(incoming);
                None
            }
            Some(current) if open_ms == current.open_time_ms() => {
                self.current = Some(incoming);
                None
            }
            Some(current) if open_ms > current.open_time_ms() => {
                let mut done = current;
                done.complete = true;
                self.last_completed_open_ms = Some(done.open_time_ms());
                self.current = Some(incoming);
                Some(done)
            }
            Some(_) => {
                debug!(open_ms, "dropping candle older than the open bar");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TF_MS: i64 = 30 * 60 * 1000;

    fn aggregator() -> BarAggregator {
        BarAggregator::new(Timeframe::M30)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn tick(price: f64) -> Tick {
        Tick {
            price,
            volume: 1.0,
            time_exchange: Utc::now(),
            time_received: Utc::now(),
        }
    }

    fn candle(ts_ms: i64, close: f64) -> CandleData {
        CandleData {
            ts: at(ts_ms),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    // An arbitrary instant 7 minutes past a 30m boundary.
    const BASE: i64 = 1_700_000_000_000 / TF_MS * TF_MS + 7 * 60 * 1000;

    #[test]
    fn test_first_tick_seeds_at_timeframe_floor() {
        let mut agg = aggregator();
        assert!(agg.on_tick(&tick(100.0), at(BASE)).is_none());

        let bar = agg.current().unwrap();
        assert_eq!(bar.open_time_ms() % TF_MS, 0);
        assert_eq!(bar.open_time_ms(), BASE / TF_MS * TF_MS);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.close, 100.0);
        assert!(!bar.complete);
    }

    #[test]
    fn test_tick_folding_updates_ohlcv() {
        let mut agg = aggregator();
        agg.on_tick(&tick(100.0), at(BASE));
        agg.on_tick(&tick(103.0), at(BASE + 1000));
        agg.on_tick(&tick(98.0), at(BASE + 2000));

        let bar = agg.current().unwrap();
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 103.0);
        assert_eq!(bar.low, 98.0);
        assert_eq!(bar.close, 98.0);
        assert_eq!(bar.volume, 3.0);
    }

    #[test]
    fn test_boundary_crossing_completes_one_bar() {
        let mut agg = aggregator();
        agg.on_tick(&tick(100.0), at(BASE));

        let open_ms = BASE / TF_MS * TF_MS;
        let done = agg.on_tick(&tick(101.0), at(open_ms + TF_MS)).unwrap();

        assert!(done.complete);
        assert_eq!(done.open_time_ms(), open_ms);
        assert_eq!(done.close, 100.0);

        // Successor opens at the next boundary, seeded from the new tick.
        let next = agg.current().unwrap();
        assert_eq!(next.open_time_ms(), open_ms + TF_MS);
        assert_eq!(next.open, 101.0);
        assert_eq!(next.high, 101.0);
        assert_eq!(next.low, 101.0);
    }

    #[test]
    fn test_multi_boundary_gap_closes_exactly_one_bar() {
        let mut agg = aggregator();
        agg.on_tick(&tick(100.0), at(BASE));
        let open_ms = BASE / TF_MS * TF_MS;

        // Next tick arrives three timeframes later.
        let done = agg.on_tick(&tick(105.0), at(open_ms + 3 * TF_MS + 1000));

        assert!(done.is_some());
        // Only one bar closed; the successor opens one timeframe after the
        // closed bar, still boundary-aligned.
        let next = agg.current().unwrap();
        assert_eq!(next.open_time_ms(), open_ms + TF_MS);
        assert_eq!(next.open_time_ms() % TF_MS, 0);
    }

    #[test]
    fn test_open_times_never_repeat_over_tick_sequences() {
        let mut agg = aggregator();
        let mut completed: Vec<Bar> = Vec::new();
        for i in 0..500 {
            let now = at(BASE + i * 5 * 60 * 1000);
            if let Some(bar) = agg.on_tick(&tick(100.0 + i as f64), now) {
                completed.push(bar);
            }
        }

        for pair in completed.windows(2) {
            assert!(pair[1].open_time_ms() > pair[0].open_time_ms());
        }
        for bar in &completed {
            assert_eq!(bar.open_time_ms() % TF_MS, 0);
        }
    }

    #[test]
    fn test_candle_passthrough_completes_on_newer_open_time() {
        let mut agg = aggregator();
        let open_ms = BASE / TF_MS * TF_MS;

        assert!(agg.on_candle(&candle(open_ms, 100.0)).is_none());
        // In-place refresh of the same open time.
        assert!(agg.on_candle(&candle(open_ms, 101.0)).is_none());
        assert_eq!(agg.current().unwrap().close, 101.0);

        let done = agg.on_candle(&candle(open_ms + TF_MS, 102.0)).unwrap();
        assert!(done.complete);
        assert_eq!(done.open_time_ms(), open_ms);
        assert_eq!(done.close, 101.0);
    }

    #[test]
    fn test_candle_rejects_misaligned_open_time() {
        let mut agg = aggregator();
        assert!(agg.on_candle(&candle(BASE, 100.0)).is_none());
        assert!(agg.current().is_none());
    }

    #[test]
    fn test_candle_drops_duplicates_and_out_of_order() {
        let mut agg = aggregator();
        let open_ms = BASE / TF_MS * TF_MS;

        agg.on_candle(&candle(open_ms, 100.0));
        agg.on_candle(&candle(open_ms + TF_MS, 101.0)).unwrap();

        // A replay of the completed bar and an older bar are both dropped
        // without disturbing the open bar.
        assert!(agg.on_candle(&candle(open_ms, 99.0)).is_none());
        assert!(agg.on_candle(&candle(open_ms - TF_MS, 98.0)).is_none());
        assert_eq!(agg.current().unwrap().open_time_ms(), open_ms + TF_MS);
    }

    #[test]
    fn test_non_positive_price_ignored() {
        let mut agg = aggregator();
        assert!(agg.on_tick(&tick(0.0), at(BASE)).is_none());
        assert!(agg.current().is_none());
    }
}
