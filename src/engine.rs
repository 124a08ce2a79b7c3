//! Single-stream pipeline from inbound events to published signals.
//!
//! One task consumes connector events in receipt order; aggregation,
//! indicator computation and signal evaluation run synchronously inside the
//! handler, so no concurrent mutation of bar or position state is possible.

use crate::aggregator::BarAggregator;
use crate::config::{BarSource, Config};
use crate::events::{Bar, EventBus};
use crate::okx::StreamEvent;
use crate::strategy::SignalEngine;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

pub struct Engine {
    aggregator: BarAggregator,
    signals: SignalEngine,
    bus: EventBus,
    bar_source: BarSource,
}

impl Engine {
    pub fn new(config: &Config, bus: EventBus) -> Self {
        Self {
            aggregator: BarAggregator::new(config.timeframe),
            signals: SignalEngine::from_config(config),
            bus,
            bar_source: config.bar_source,
        }
    }

    /// Handle one inbound stream event.
    pub fn handle(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Tick(tick) => {
                self.signals.state.prices.push(tick.price);
                self.bus.publish_tick(tick);
                if self.bar_source == BarSource::Ticks {
                    if let Some(bar) = self.aggregator.on_tick(&tick, Utc::now()) {
                        self.on_completed_bar(bar);
                    }
                    if let Some(open) = self.aggregator.current() {
                        self.bus.publish_bar_update(*open);
                    }
                }
            }
            StreamEvent::Candle(candle) => {
                if self.bar_source != BarSource::Candles {
                    return;
                }
                if let Some(bar) = self.aggregator.on_candle(&candle) {
                    self.on_completed_bar(bar);
                }
                if let Some(open) = self.aggregator.current() {
                    self.bus.publish_bar_update(*open);
                }
            }
        }
    }

    /// A completed bar: append to history, publish, evaluate. A bar rejected
    /// by the ordering invariant is dropped before publication, and a bar
    /// whose evaluation yields nothing never blocks the next one.
    fn on_completed_bar(&mut self, bar: Bar) {
        debug!(open_time = %bar.open_time, close = bar.close, "bar complete");
        if !self.signals.state.push_bar(bar) {
            return;
        }
        self.bus.publish_bar(bar);
        if let Some(signal) = self.signals.evaluate_latest(&bar) {
            self.bus.publish_signal(signal);
        }
    }

    /// Consume events until the connector side closes the channel.
    pub async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!("stream event channel closed, engine stopping");
    }
}
