//! Supertrend: ATR bands with trend-continuation memory.

use super::atr::atr;
use crate::events::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
}

/// One Supertrend computation over the current bar history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendSnapshot {
    pub trend: Trend,
    pub atr: f64,
    pub upper_band: f64,
    pub lower_band: f64,
}

/// Supertrend calculator.
///
/// Stateless per call except for the previous trend: the continuation rule
/// keeps the prior trend whenever the close crosses neither band, so that
/// one value must survive across invocations.
#[derive(Debug, Clone)]
pub struct Supertrend {
    period: usize,
    multiplier: f64,
    prev_trend: Option<Trend>,
}

impl Supertrend {
    pub fn new(period: usize, multiplier: f64) -> Self {
        Self {
            period,
            multiplier,
            prev_trend: None,
        }
    }

    /// Minimum history length before a snapshot can be produced.
    pub fn min_bars(&self) -> usize {
        self.period + 1
    }

    pub fn compute(&mut self, bars: &[Bar]) -> Option<SupertrendSnapshot> {
        let atr = atr(bars, self.period)?;
        let last = bars.last()?;
        let mid = (last.high + last.low) / 2.0;
        let upper_band = mid + self.multiplier * atr;
        let lower_band = mid - self.multiplier * atr;

        let trend = if last.close > upper_band {
            Trend::Up
        } else if last.close < lower_band {
            Trend::Down
        } else {
            match self.prev_trend {
                Some(prev) => prev,
                // First computation with no crossing: side of the band
                // midpoint decides.
                None => {
                    if last.close >= mid {
                        Trend::Up
                    } else {
                        Trend::Down
                    }
                }
            }
        };
        self.prev_trend = Some(trend);

        Some(SupertrendSnapshot {
            trend,
            atr,
            upper_band,
            lower_band,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(high: f64, low: f64, close: f64) -> Bar {
        let open_time = Utc.timestamp_millis_opt(0).unwrap();
        Bar {
            open_time,
            close_time: open_time,
            open: close,
            high,
            low,
            close,
            volume: 1.0,
            complete: true,
        }
    }

    fn flat_bars(count: usize) -> Vec<Bar> {
        (0..count).map(|_| bar(101.0, 99.0, 100.0)).collect()
    }

    #[test]
    fn test_insufficient_history_yields_none() {
        let mut st = Supertrend::new(10, 3.0);
        assert!(st.compute(&flat_bars(10)).is_none());
        assert_eq!(st.min_bars(), 11);
    }

    #[test]
    fn test_trend_flips_up_on_close_above_upper_band() {
        let mut st = Supertrend::new(3, 0.2);
        let mut bars = flat_bars(5);
        // Establish a down trend baseline: ATR 4, lower band 95.2.
        bars.push(bar(100.0, 92.0, 93.0));
        let snap = st.compute(&bars).unwrap();
        assert_eq!(snap.trend, Trend::Down);

        // ATR 7, mid 102, upper band 103.4: close 104 crosses above.
        bars.push(bar(104.0, 100.0, 104.0));
        let snap = st.compute(&bars).unwrap();
        assert_eq!(snap.trend, Trend::Up);
        assert!(snap.upper_band < 104.0);
    }

    #[test]
    fn test_trend_flips_down_on_close_below_lower_band() {
        let mut st = Supertrend::new(3, 0.2);
        let mut bars = flat_bars(5);
        // ATR 4, mid 104, upper band 104.8: close 107 crosses above.
        bars.push(bar(108.0, 100.0, 107.0));
        let snap = st.compute(&bars).unwrap();
        assert_eq!(snap.trend, Trend::Up);

        // ATR 9, mid 93, lower band 91.2: close 90 crosses below.
        bars.push(bar(96.0, 90.0, 90.0));
        let snap = st.compute(&bars).unwrap();
        assert_eq!(snap.trend, Trend::Down);
        assert!(snap.lower_band > 90.0);
    }

    #[test]
    fn test_trend_persists_without_crossing() {
        let mut st = Supertrend::new(3, 3.0);
        let mut bars = flat_bars(5);
        bars.push(bar(110.0, 106.0, 110.0));
        let first = st.compute(&bars).unwrap().trend;

        // Closes drifting inside the wide bands never flip the trend.
        for close in [109.0, 108.5, 109.5, 108.0] {
            bars.push(bar(close + 1.0, close - 1.0, close));
            let snap = st.compute(&bars).unwrap();
            assert_eq!(snap.trend, first);
        }
    }

    #[test]
    fn test_bands_are_mid_plus_minus_multiplier_atr() {
        let mut st = Supertrend::new(2, 2.0);
        let bars = vec![
            bar(101.0, 99.0, 100.0),
            bar(102.0, 100.0, 101.0), // TR 2
            bar(103.0, 101.0, 102.0), // TR 2
        ];
        let snap = st.compute(&bars).unwrap();
        assert!((snap.atr - 2.0).abs() < 1e-12);
        // mid = (103 + 101) / 2 = 102
        assert!((snap.upper_band - 106.0).abs() < 1e-12);
        assert!((snap.lower_band - 98.0).abs() < 1e-12);
    }
}
