//! Position-aware signal state machine.
//!
//! Invoked once per completed bar. The engine computes the active strategy's
//! decision, tracks position bias, and publishes a [`Signal`] only when the
//! decision differs from the previously emitted one (edge-triggered, never
//! level-triggered). Too little history suppresses output entirely; that is
//! a normal condition, not an error.

pub mod combined;
pub mod ema_cross;

pub use combined::CombinedStrategy;
pub use ema_cross::EmaCrossStrategy;

use crate::config::{Config, StrategyKind};
use crate::events::{Bar, Signal, SignalAction};
use crate::series::BoundedSeries;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Current position bias. Mutated only on a confirmed entry/exit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionBias {
    #[default]
    Flat,
    Long,
    Short,
}

/// The one explicitly owned mutable state object: bar and tick-price
/// history, the last emitted action and the position bias. Created at
/// startup, reset only on deliberate restart.
#[derive(Debug)]
pub struct EngineState {
    pub bars: BoundedSeries<Bar>,
    pub prices: BoundedSeries<f64>,
    pub last_action: Option<SignalAction>,
    pub bias: PositionBias,
}

impl EngineState {
    pub fn new(bar_capacity: usize, price_capacity: usize) -> Self {
        Self {
            bars: BoundedSeries::new(bar_capacity),
            prices: BoundedSeries::new(price_capacity),
            last_action: None,
            bias: PositionBias::Flat,
        }
    }

    /// Append a completed bar. Bars must arrive in strictly increasing
    /// open-time order; duplicates and late arrivals are dropped.
    pub fn push_bar(&mut self, bar: Bar) -> bool {
        if let Some(last) = self.bars.last() {
            if bar.open_time <= last.open_time {
                warn!(
                    open_time = %bar.open_time,
                    last_open_time = %last.open_time,
                    "dropping bar with non-increasing open time"
                );
                return false;
            }
        }
        self.bars.push(bar);
        true
    }
}

/// The strategy selected at startup.
#[derive(Debug, Clone)]
pub enum ActiveStrategy {
    EmaCrossover(EmaCrossStrategy),
    Combined(CombinedStrategy),
}

impl ActiveStrategy {
    pub fn from_config(config: &Config) -> Self {
        match config.strategy {
            StrategyKind::EmaCrossover => {
                ActiveStrategy::EmaCrossover(EmaCrossStrategy::new(config.ema_short, config.ema_long))
            }
            StrategyKind::Combined => ActiveStrategy::Combined(CombinedStrategy::new(
                config.supertrend_period,
                config.supertrend_multiplier,
                config.bollinger_length,
                config.bollinger_deviation,
                config.fractal_period,
            )),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ActiveStrategy::EmaCrossover(_) => "ema-crossover",
            ActiveStrategy::Combined(_) => "combined",
        }
    }
}

/// Drives the active strategy over the owned state, once per completed bar.
#[derive(Debug)]
pub struct SignalEngine {
    strategy: ActiveStrategy,
    pub state: EngineState,
}

impl SignalEngine {
    pub fn new(strategy: ActiveStrategy, state: EngineState) -> Self {
        Self { strategy, state }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ActiveStrategy::from_config(config),
            EngineState::new(config.bar_history, config.price_history),
        )
    }

    /// Append one completed bar and evaluate the strategy over the updated
    /// history. Returns a signal only on an accepted bar whose computed
    /// decision differs from the last emitted one.
    pub fn on_bar(&mut self, bar: Bar) -> Option<Signal> {
        if !self.state.push_bar(bar) {
            return None;
        }
        self.evaluate_latest(&bar)
    }

    /// Evaluate the strategy over the current history, where `bar` is the
    /// newest appended bar.
    pub fn evaluate_latest(&mut self, bar: &Bar) -> Option<Signal> {
        let mut indicators = BTreeMap::new();
        let bars = self.state.bars.to_vec();

        let (action, next_bias) = match &mut self.strategy {
            ActiveStrategy::EmaCrossover(strategy) => {
                let closes: Vec<f64> = bars.iter().map(|bar| bar.close).collect();
                let action = strategy.evaluate(&closes, &mut indicators)?;
                (action, self.state.bias)
            }
            ActiveStrategy::Combined(strategy) => {
                strategy.evaluate(&bars, self.state.bias, &mut indicators)?
            }
        };

        if self.state.bias != next_bias {
            info!(from = ?self.state.bias, to = ?next_bias, "position bias transition");
        }
        self.state.bias = next_bias;

        if self.state.last_action == Some(action) {
            debug!(%action, "decision unchanged, no signal");
            return None;
        }
        self.state.last_action = Some(action);

        let signal = Signal {
            action,
            price: bar.close,
            time: bar.close_time,
            strategy: self.strategy.tag(),
            indicators,
        };
        info!(action = %signal.action, price = signal.price, strategy = signal.strategy, "signal");
        Some(signal)
    }
}
