//! Fractal detection and trend classification.
//!
//! A bar at the midpoint of a `period`-wide window is a high (low) fractal
//! when its high (low) strictly exceeds (is strictly below) every other high
//! (low) in the window. The most recent fractals, together with the close's
//! position relative to the Bollinger middle band, classify the trend.

use super::moving::BollingerBands;
use crate::events::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractalTrend {
    StronglyBullish,
    Bullish,
    Neutral,
    Bearish,
    StronglyBearish,
}

impl FractalTrend {
    pub fn is_bullish(&self) -> bool {
        matches!(self, FractalTrend::Bullish | FractalTrend::StronglyBullish)
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, FractalTrend::Bearish | FractalTrend::StronglyBearish)
    }
}

fn is_high_fractal(bars: &[Bar], mid: usize, half: usize) -> bool {
    let center = bars[mid].high;
    (mid - half..=mid + half)
        .filter(|&i| i != mid)
        .all(|i| bars[i].high < center)
}

fn is_low_fractal(bars: &[Bar], mid: usize, half: usize) -> bool {
    let center = bars[mid].low;
    (mid - half..=mid + half)
        .filter(|&i| i != mid)
        .all(|i| bars[i].low > center)
}

/// Index of the most recent high fractal, scanning backwards from the newest
/// bar that has `period / 2` later neighbors.
pub fn latest_high_fractal(bars: &[Bar], period: usize) -> Option<usize> {
    let half = period / 2;
    if period < 3 || period % 2 == 0 || bars.len() < period {
        return None;
    }
    (half..bars.len() - half)
        .rev()
        .find(|&mid| is_high_fractal(bars, mid, half))
}

/// Index of the most recent low fractal.
pub fn latest_low_fractal(bars: &[Bar], period: usize) -> Option<usize> {
    let half = period / 2;
    if period < 3 || period % 2 == 0 || bars.len() < period {
        return None;
    }
    (half..bars.len() - half)
        .rev()
        .find(|&mid| is_low_fractal(bars, mid, half))
}

/// Classify the trend from the latest fractals and the Bollinger position of
/// the newest close.
///
/// A close breaking above the last swing-high fractal while above the middle
/// band is strongly bullish; the mirror case is strongly bearish; otherwise
/// the side of the middle band decides the grade.
pub fn fractal_trend(bars: &[Bar], period: usize, bands: &BollingerBands) -> Option<FractalTrend> {
    if period < 3 || period % 2 == 0 || bars.len() < period {
        return None;
    }
    let close = bars.last()?.close;
    let swing_high = latest_high_fractal(bars, period).map(|i| bars[i].high);
    let swing_low = latest_low_fractal(bars, period).map(|i| bars[i].low);

    if let Some(high) = swing_high {
        if close > high && close > bands.middle {
            return Some(FractalTrend::StronglyBullish);
        }
    }
    if let Some(low) = swing_low {
        if close < low && close < bands.middle {
            return Some(FractalTrend::StronglyBearish);
        }
    }
    Some(if close > bands.middle {
        FractalTrend::Bullish
    } else if close < bands.middle {
        FractalTrend::Bearish
    } else {
        FractalTrend::Neutral
    })
}
