//! Resilient connector for the OKX public market feed.
//!
//! Owns one persistent WebSocket connection, subscribes to the ticker and
//! candle channels for the configured instrument, and turns inbound frames
//! into typed [`StreamEvent`]s delivered downstream in receipt order.
//!
//! Failure handling: malformed frames are logged and skipped with the stream
//! left open; a dropped connection (or an idle stream that stops answering
//! the periodic ping) moves the connector through an explicit reconnect state
//! machine with bounded exponential backoff. Exhausting the attempt budget is
//! surfaced as [`BotError::ReconnectExhausted`].

pub mod protocol;

use crate::config::Config;
use crate::error::BotError;
use crate::events::Tick;
use futures::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use self::protocol::{
    CandleData, InboundFrame, SubscribeRequest, SubscriptionArg, TickerData, TICKERS_CHANNEL,
};

/// Lifecycle of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    BackingOff,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::BackingOff => "backing-off",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded exponential backoff schedule for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based):
    /// `initial_delay * multiplier^(attempt - 1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        self.initial_delay.mul_f64(factor)
    }

    /// Backoff delay before reconnect attempt number `attempt`, or `None`
    /// once the attempt budget is exhausted.
    pub fn evaluate(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_attempts {
            None
        } else {
            Some(self.delay(attempt))
        }
    }
}

/// Typed events delivered downstream in receipt order.
#[derive(Debug, Clone, Copy)]
pub enum StreamEvent {
    Tick(Tick),
    Candle(CandleData),
}

/// Per-process stream counters, logged when a session ends.
#[derive(Debug, Default, Clone, Copy)]
struct StreamStats {
    frames_decoded: u64,
    frames_skipped: u64,
    ticks: u64,
    candles: u64,
}

enum SessionEnd {
    /// Shutdown was requested; the transport is closed.
    Shutdown,
    /// The connection dropped or stalled.
    Dropped { subscribed: bool },
}

enum TextOutcome {
    Continue,
    /// Downstream receiver is gone; nothing left to feed.
    ConsumerGone,
}

/// Connector owning one persistent stream to the OKX public feed.
pub struct OkxConnector {
    url: String,
    symbol: String,
    candle_channel: String,
    ping_interval: Duration,
    idle_timeout: Duration,
    clock_skew_threshold_ms: i64,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    stats: StreamStats,
}

impl OkxConnector {
    pub fn new(config: &Config) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url: config.ws_url.clone(),
            symbol: config.symbol.clone(),
            candle_channel: config.timeframe.candle_channel(),
            ping_interval: config.ping_interval,
            idle_timeout: config.idle_timeout,
            clock_skew_threshold_ms: config.clock_skew_threshold.as_millis() as i64,
            policy: ReconnectPolicy {
                initial_delay: config.reconnect.initial_delay,
                multiplier: config.reconnect.multiplier,
                max_attempts: config.reconnect.max_attempts,
            },
            state_tx,
            stats: StreamStats::default(),
        }
    }

    /// Observe connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        debug!(state = %state, "connection state");
        let _ = self.state_tx.send(state);
    }

    /// Drive the connection until shutdown is requested or the reconnect
    /// budget is exhausted. Suspends only at I/O boundaries and during
    /// backoff delays.
    pub async fn run(
        mut self,
        events: mpsc::Sender<StreamEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BotError> {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);

            match self.session(&events, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    self.set_state(ConnectionState::Disconnected);
                    self.log_stats();
                    return Ok(());
                }
                Ok(SessionEnd::Dropped { subscribed }) => {
                    // A session that reached a live subscription resets the
                    // failure budget.
                    if subscribed {
                        attempt = 0;
                    }
                }
                Err(err) => {
                    warn!(%err, "stream session failed");
                }
            }
            self.set_state(ConnectionState::Disconnected);

            attempt += 1;
            match self.policy.evaluate(attempt) {
                Some(delay) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    self.set_state(ConnectionState::BackingOff);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                info!("shutdown requested during backoff");
                                self.set_state(ConnectionState::Disconnected);
                                self.log_stats();
                                return Ok(());
                            }
                        }
                    }
                }
                None => {
                    self.set_state(ConnectionState::Failed);
                    error!(
                        attempts = attempt - 1,
                        "reconnect attempts exhausted, giving up"
                    );
                    self.log_stats();
                    return Err(BotError::ReconnectExhausted {
                        attempts: attempt - 1,
                    });
                }
            }
        }
    }

    /// One connect-subscribe-read session.
    async fn session(
        &mut self,
        events: &mpsc::Sender<StreamEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, BotError> {
        let (ws_stream, _) = connect_async(&self.url).await?;
        info!(url = %self.url, "connected to OKX public feed");
        let (mut write, mut read) = ws_stream.split();

        let request = SubscribeRequest::new(vec![
            SubscriptionArg::new(TICKERS_CHANNEL, self.symbol.clone()),
            SubscriptionArg::new(self.candle_channel.clone(), self.symbol.clone()),
        ]);
        write
            .send(Message::text(serde_json::to_string(&request)?))
            .await?;
        debug!(symbol = %self.symbol, channel = %self.candle_channel, "subscription request sent");

        let mut pending_acks = request.args.len();
        let mut subscribed = false;
        let mut last_rx = Instant::now();
        let mut ping = tokio::time::interval(self.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_rx = Instant::now();
                            if text.as_str() == "pong" {
                                continue;
                            }
                            match self.on_text(text.as_str(), events, &mut pending_acks, &mut subscribed).await? {
                                TextOutcome::Continue => {}
                                TextOutcome::ConsumerGone => {
                                    warn!("event receiver dropped, closing stream");
                                    let _ = write.send(Message::Close(None)).await;
                                    return Ok(SessionEnd::Shutdown);
                                }
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            // Heartbeat frames - tungstenite answers pings itself
                            last_rx = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(?frame, "server closed connection");
                            return Ok(SessionEnd::Dropped { subscribed });
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            error!(%err, "websocket error");
                            return Ok(SessionEnd::Dropped { subscribed });
                        }
                        None => {
                            warn!("stream ended");
                            return Ok(SessionEnd::Dropped { subscribed });
                        }
                    }
                }
                _ = ping.tick() => {
                    // A silent stream is indistinguishable from a dead one:
                    // missing acknowledgment within the idle deadline is
                    // treated like an unexpected close.
                    if last_rx.elapsed() > self.idle_timeout {
                        warn!(
                            idle_secs = last_rx.elapsed().as_secs(),
                            "no traffic within idle deadline, treating as disconnect"
                        );
                        return Ok(SessionEnd::Dropped { subscribed });
                    }
                    if write.send(Message::text("ping")).await.is_err() {
                        warn!("failed to send ping, connection likely dead");
                        return Ok(SessionEnd::Dropped { subscribed });
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped shutdown handle means the process is going
                    // away; treat it like an explicit request.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("shutdown requested, closing stream");
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Decode one text frame and forward its events. Malformed frames are
    /// skipped without terminating the connection; a rejected subscription
    /// tears the session down.
    async fn on_text(
        &mut self,
        text: &str,
        events: &mpsc::Sender<StreamEvent>,
        pending_acks: &mut usize,
        subscribed: &mut bool,
    ) -> Result<TextOutcome, BotError> {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frames_skipped += 1;
                warn!(%err, "discarding malformed frame");
                debug!(raw = %&text[..text.len().min(200)], "malformed frame payload");
                return Ok(TextOutcome::Continue);
            }
        };
        self.stats.frames_decoded += 1;

        match frame {
            InboundFrame::Event(event) => match event.event.as_str() {
                "subscribe" => {
                    if let Some(arg) = &event.arg {
                        debug!(channel = %arg.channel, "subscription confirmed");
                    }
                    *pending_acks = pending_acks.saturating_sub(1);
                    if *pending_acks == 0 && !*subscribed {
                        *subscribed = true;
                        self.set_state(ConnectionState::Connected);
                        info!(symbol = %self.symbol, "all subscriptions confirmed");
                    }
                }
                "error" => {
                    let detail = format!(
                        "code={} msg={}",
                        event.code.as_deref().unwrap_or("?"),
                        event.msg.as_deref().unwrap_or("?"),
                    );
                    return Err(BotError::SubscriptionRejected(detail));
                }
                other => debug!(event = other, "ignoring control event"),
            },
            InboundFrame::Data(data) => {
                if data.arg.channel == TICKERS_CHANNEL {
                    let tickers: Vec<TickerData> = match serde_json::from_value(data.data) {
                        Ok(tickers) => tickers,
                        Err(err) => {
                            self.stats.frames_skipped += 1;
                            warn!(%err, "discarding malformed ticker payload");
                            return Ok(TextOutcome::Continue);
                        }
                    };
                    for ticker in tickers {
                        let tick = self.to_tick(ticker);
                        self.stats.ticks += 1;
                        if events.send(StreamEvent::Tick(tick)).await.is_err() {
                            return Ok(TextOutcome::ConsumerGone);
                        }
                    }
                } else if data.arg.channel == self.candle_channel {
                    let candles: Vec<CandleData> = match serde_json::from_value(data.data) {
                        Ok(candles) => candles,
                        Err(err) => {
                            self.stats.frames_skipped += 1;
                            warn!(%err, "discarding malformed candle payload");
                            return Ok(TextOutcome::Continue);
                        }
                    };
                    for candle in candles {
                        self.stats.candles += 1;
                        if events.send(StreamEvent::Candle(candle)).await.is_err() {
                            return Ok(TextOutcome::ConsumerGone);
                        }
                    }
                } else {
                    debug!(channel = %data.arg.channel, "ignoring frame for unknown channel");
                }
            }
        }

        Ok(TextOutcome::Continue)
    }

    fn to_tick(&self, ticker: TickerData) -> Tick {
        let now = chrono::Utc::now();
        let skew_ms = (now - ticker.ts).num_milliseconds().abs();
        if skew_ms > self.clock_skew_threshold_ms {
            // Skew is worth an operator's attention but never interrupts the
            // stream.
            warn!(
                skew_ms,
                threshold_ms = self.clock_skew_threshold_ms,
                "clock skew between exchange and local time"
            );
        }
        Tick {
            price: ticker.last,
            volume: ticker.vol24h,
            time_exchange: ticker.ts,
            time_received: now,
        }
    }

    fn log_stats(&self) {
        info!(
            frames_decoded = self.stats.frames_decoded,
            frames_skipped = self.stats.frames_skipped,
            ticks = self.stats.ticks,
            candles = self.stats.candles,
            "stream statistics"
        );
    }
}
