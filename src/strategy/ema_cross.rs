//! EMA crossover strategy.

use crate::events::SignalAction;
use crate::indicators::ema;
use std::collections::BTreeMap;

/// Detects short/long EMA crossovers on consecutive bars: a transition from
/// `short < long` to `short > long` is a buy, the reverse a sell. Position
/// bias is not tracked; emission discipline lives in the signal engine.
#[derive(Debug, Clone)]
pub struct EmaCrossStrategy {
    short: usize,
    long: usize,
}

impl EmaCrossStrategy {
    pub fn new(short: usize, long: usize) -> Self {
        Self { short, long }
    }

    /// Longest history one evaluation needs: the preceding bar's long EMA.
    pub fn min_bars(&self) -> usize {
        self.long + 1
    }

    pub fn evaluate(
        &self,
        closes: &[f64],
        indicators: &mut BTreeMap<String, f64>,
    ) -> Option<SignalAction> {
        if closes.len() < self.min_bars() {
            return None;
        }
        let short_now = ema(closes, self.short)?;
        let long_now = ema(closes, self.long)?;
        let previous = &closes[..closes.len() - 1];
        let short_prev = ema(previous, self.short)?;
        let long_prev = ema(previous, self.long)?;

        indicators.insert("ema_short".to_string(), short_now);
        indicators.insert("ema_long".to_string(), long_now);
        indicators.insert("ema_short_prev".to_string(), short_prev);
        indicators.insert("ema_long_prev".to_string(), long_prev);

        let action = if short_prev <= long_prev && short_now > long_now {
            SignalAction::Buy
        } else if short_prev >= long_prev && short_now < long_now {
            SignalAction::Sell
        } else {
            SignalAction::Hold
        };
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(strategy: &EmaCrossStrategy, closes: &[f64]) -> Option<SignalAction> {
        let mut indicators = BTreeMap::new();
        strategy.evaluate(closes, &mut indicators)
    }

    #[test]
    fn test_insufficient_history_suppresses_decision() {
        let strategy = EmaCrossStrategy::new(3, 5);
        assert_eq!(evaluate(&strategy, &[1.0; 5]), None);
        assert!(evaluate(&strategy, &[1.0; 6]).is_some());
    }

    #[test]
    fn test_upward_crossover_is_buy() {
        let strategy = EmaCrossStrategy::new(2, 4);
        // Decline keeps short below long, then a sharp rally crosses it over.
        let mut closes = vec![110.0, 108.0, 106.0, 104.0, 102.0, 100.0];
        let before = evaluate(&strategy, &closes).unwrap();
        assert_eq!(before, SignalAction::Hold);

        closes.push(120.0);
        assert_eq!(evaluate(&strategy, &closes), Some(SignalAction::Buy));
    }

    #[test]
    fn test_downward_crossover_is_sell() {
        let strategy = EmaCrossStrategy::new(2, 4);
        let mut closes = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        closes.push(90.0);
        assert_eq!(evaluate(&strategy, &closes), Some(SignalAction::Sell));
    }

    #[test]
    fn test_no_crossover_holds() {
        let strategy = EmaCrossStrategy::new(2, 4);
        // Steady rally: short stays above long the whole way.
        let closes = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0, 112.0];
        assert_eq!(evaluate(&strategy, &closes), Some(SignalAction::Hold));
    }

    #[test]
    fn test_indicator_values_recorded() {
        let strategy = EmaCrossStrategy::new(2, 4);
        let closes = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        let mut indicators = BTreeMap::new();
        strategy.evaluate(&closes, &mut indicators).unwrap();
        assert!(indicators.contains_key("ema_short"));
        assert!(indicators.contains_key("ema_long"));
        assert!(indicators["ema_short"] > indicators["ema_long"]);
    }
}
