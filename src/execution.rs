//! Interface contract for the downstream execution collaborator.
//!
//! Order placement, leverage and account queries live outside this crate;
//! signals reach an implementation through the event bus, never by a direct
//! call from the core pipeline. [`TradeGate`] is the consumer-side discipline
//! the orchestrating layer applies before placing orders: one actionable side
//! per signal, with a minimum cooldown between accepted trades.

use crate::events::{Signal, SignalAction};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub filled_size: f64,
    pub avg_price: f64,
}

/// Exchange trading operations consumed by the signal consumer.
#[allow(async_fn_in_trait)]
pub trait ExecutionClient {
    type Error: std::error::Error;

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        size: f64,
    ) -> Result<OrderResult, Self::Error>;

    async fn set_leverage(
        &self,
        symbol: &str,
        leverage: u32,
        margin_mode: &str,
    ) -> Result<bool, Self::Error>;
}

/// Debounces signals into at most one accepted trade per cooldown interval.
/// HOLD signals are never actionable.
#[derive(Debug)]
pub struct TradeGate {
    cooldown: Duration,
    last_accepted: Option<Instant>,
}

impl TradeGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accepted: None,
        }
    }

    /// The side to trade for this signal, or `None` when the signal is not
    /// actionable or the cooldown has not elapsed.
    pub fn accept(&mut self, signal: &Signal) -> Option<OrderSide> {
        let side = match signal.action {
            SignalAction::Buy => OrderSide::Buy,
            SignalAction::Sell => OrderSide::Sell,
            SignalAction::Hold => return None,
        };
        if let Some(last) = self.last_accepted {
            if last.elapsed() < self.cooldown {
                debug!(action = %signal.action, "signal within cooldown, skipping");
                return None;
            }
        }
        self.last_accepted = Some(Instant::now());
        Some(side)
    }
}
