//! Average true range.

use crate::events::Bar;

/// True range of a bar given the previous close.
pub fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Mean true range over the trailing `period` bars. Requires `period + 1`
/// bars so every bar in the window has a previous close.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let start = bars.len() - period;
    let sum: f64 = (start..bars.len())
        .map(|i| true_range(&bars[i], bars[i - 1].close))
        .sum();
    Some(sum / period as f64)
}
