//! Combined Supertrend + fractal strategy with explicit position bias.

use super::PositionBias;
use crate::events::{Bar, SignalAction};
use crate::indicators::{bollinger, fractal_trend, Supertrend, Trend};
use std::collections::BTreeMap;

/// Enters LONG when Supertrend points up and the fractal classification is
/// bullish, SHORT symmetrically; exits to FLAT when the fractal trend flips
/// against the held bias.
#[derive(Debug, Clone)]
pub struct CombinedStrategy {
    supertrend: Supertrend,
    bollinger_length: usize,
    bollinger_deviation: f64,
    fractal_period: usize,
}

impl CombinedStrategy {
    pub fn new(
        supertrend_period: usize,
        supertrend_multiplier: f64,
        bollinger_length: usize,
        bollinger_deviation: f64,
        fractal_period: usize,
    ) -> Self {
        Self {
            supertrend: Supertrend::new(supertrend_period, supertrend_multiplier),
            bollinger_length,
            bollinger_deviation,
            fractal_period,
        }
    }

    pub fn min_bars(&self) -> usize {
        self.supertrend
            .min_bars()
            .max(self.bollinger_length)
            .max(self.fractal_period)
    }

    pub fn evaluate(
        &mut self,
        bars: &[Bar],
        bias: PositionBias,
        indicators: &mut BTreeMap<String, f64>,
    ) -> Option<(SignalAction, PositionBias)> {
        if bars.len() < self.min_bars() {
            return None;
        }
        let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
        let bands = bollinger(&closes, self.bollinger_length, self.bollinger_deviation)?;
        let st = self.supertrend.compute(bars)?;
        let fractal = fractal_trend(bars, self.fractal_period, &bands)?;

        indicators.insert("supertrend_atr".to_string(), st.atr);
        indicators.insert("supertrend_upper".to_string(), st.upper_band);
        indicators.insert("supertrend_lower".to_string(), st.lower_band);
        indicators.insert("bb_upper".to_string(), bands.upper);
        indicators.insert("bb_middle".to_string(), bands.middle);
        indicators.insert("bb_lower".to_string(), bands.lower);

        let decision = match bias {
            PositionBias::Flat => {
                if st.trend == Trend::Up && fractal.is_bullish() {
                    (SignalAction::Buy, PositionBias::Long)
                } else if st.trend == Trend::Down && fractal.is_bearish() {
                    (SignalAction::Sell, PositionBias::Short)
                } else {
                    (SignalAction::Hold, bias)
                }
            }
            PositionBias::Long => {
                if fractal.is_bearish() {
                    (SignalAction::Sell, PositionBias::Flat)
                } else {
                    (SignalAction::Hold, bias)
                }
            }
            PositionBias::Short => {
                if fractal.is_bullish() {
                    (SignalAction::Buy, PositionBias::Flat)
                } else {
                    (SignalAction::Hold, bias)
                }
            }
        };
        Some(decision)
    }
}
