//! Core market data types and the event distribution point.
//!
//! Delivery policy: ticks and in-progress bar updates travel over a small
//! lossy broadcast channel where a lagging subscriber loses the oldest
//! entries and skips ahead. Completed bars and signals travel over deep
//! channels sized far beyond bar cadence, so consumers keeping pace with the
//! stream never lose them. Within each channel, delivery order is publish
//! order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// A single ticker observation from the exchange.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Tick {
    pub price: f64,
    pub volume: f64,
    /// Server-side event time.
    pub time_exchange: DateTime<Utc>,
    /// Local receipt time.
    pub time_received: DateTime<Utc>,
}

/// One OHLCV bar aligned to a timeframe boundary.
///
/// Exactly one in-progress bar exists at a time; once `complete` it is frozen
/// and never mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub complete: bool,
}

impl Bar {
    pub fn open_time_ms(&self) -> i64 {
        self.open_time.timestamp_millis()
    }
}

/// Directional decision produced by one strategy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Edge-triggered trading signal, published once per decision change.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub action: SignalAction,
    pub price: f64,
    pub time: DateTime<Utc>,
    pub strategy: &'static str,
    /// Indicator values that supported the decision, for downstream logging.
    pub indicators: BTreeMap<String, f64>,
}

/// Raw feed events fanned out to observers over the lossy channel.
#[derive(Debug, Clone, Copy)]
pub enum MarketEvent {
    Tick(Tick),
    /// Refresh of the current in-progress bar.
    BarUpdate(Bar),
}

/// Single-producer, multi-consumer fan-out for ticks, bars and signals.
#[derive(Debug, Clone)]
pub struct EventBus {
    market: broadcast::Sender<MarketEvent>,
    bars: broadcast::Sender<Bar>,
    signals: broadcast::Sender<Signal>,
}

impl EventBus {
    pub fn new(market_buffer: usize, bar_buffer: usize) -> Self {
        let (market, _) = broadcast::channel(market_buffer);
        let (bars, _) = broadcast::channel(bar_buffer);
        let (signals, _) = broadcast::channel(bar_buffer);
        Self {
            market,
            bars,
            signals,
        }
    }

    pub fn publish_tick(&self, tick: Tick) {
        let _ = self.market.send(MarketEvent::Tick(tick));
    }

    pub fn publish_bar_update(&self, bar: Bar) {
        let _ = self.market.send(MarketEvent::BarUpdate(bar));
    }

    pub fn publish_bar(&self, bar: Bar) {
        let _ = self.bars.send(bar);
    }

    pub fn publish_signal(&self, signal: Signal) {
        let _ = self.signals.send(signal);
    }

    pub fn subscribe_market(&self) -> broadcast::Receiver<MarketEvent> {
        self.market.subscribe()
    }

    pub fn subscribe_bars(&self) -> broadcast::Receiver<Bar> {
        self.bars.subscribe()
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }
}
