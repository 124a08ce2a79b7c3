/// OKX Signal Bot - Core Library
///
/// Ingests the OKX public market feed for a single instrument, aggregates it
/// into timeframe-aligned OHLCV bars, computes technical indicators over the
/// bounded bar history, and publishes edge-triggered BUY/SELL signals to
/// downstream consumers.
///
/// Data flows strictly one way:
/// connector -> aggregator -> indicators -> signal state machine -> event bus.
/// No component reaches backward into an earlier one, and a single task
/// drives all downstream computation in receipt order.
pub mod aggregator;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod indicators;
pub mod okx;
pub mod series;
pub mod strategy;

// Re-export commonly used types for convenience
pub use config::{BarSource, Config, ReconnectConfig, StrategyKind, Timeframe};
pub use engine::Engine;
pub use error::BotError;
pub use events::{Bar, EventBus, MarketEvent, Signal, SignalAction, Tick};
pub use execution::{ExecutionClient, OrderResult, OrderSide, TradeGate};
pub use okx::{ConnectionState, OkxConnector, ReconnectPolicy, StreamEvent};
pub use series::BoundedSeries;
pub use strategy::{EngineState, PositionBias, SignalEngine};
