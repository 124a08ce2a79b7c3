//! Runtime configuration, loaded from the environment and validated before
//! any connection attempt.

use crate::error::BotError;
use std::time::Duration;
use url::Url;

/// Default OKX public WebSocket endpoint.
///
/// See docs: <https://www.okx.com/docs-v5/en/#overview-api-resources-and-support>
pub const DEFAULT_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// Strategy selected once at startup; never changed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    EmaCrossover,
    Combined,
}

impl StrategyKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ema" | "ema-crossover" => Some(StrategyKind::EmaCrossover),
            "combined" => Some(StrategyKind::Combined),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::EmaCrossover => "ema-crossover",
            StrategyKind::Combined => "combined",
        }
    }
}

/// Where completed bars come from: exchange-aggregated candle pushes
/// (default) or local folding of ticker prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarSource {
    Candles,
    Ticks,
}

impl BarSource {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "candles" => Some(BarSource::Candles),
            "ticks" => Some(BarSource::Ticks),
            _ => None,
        }
    }
}

/// Supported bar durations, with their OKX candle channel labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
}

impl Timeframe {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "1m" => Some(Timeframe::M1),
            "3m" => Some(Timeframe::M3),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1H" => Some(Timeframe::H1),
            "2H" => Some(Timeframe::H2),
            "4H" => Some(Timeframe::H4),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H2 => "2H",
            Timeframe::H4 => "4H",
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.millis() as u64)
    }

    pub fn millis(&self) -> i64 {
        match self {
            Timeframe::M1 => 60_000,
            Timeframe::M3 => 180_000,
            Timeframe::M5 => 300_000,
            Timeframe::M15 => 900_000,
            Timeframe::M30 => 1_800_000,
            Timeframe::H1 => 3_600_000,
            Timeframe::H2 => 7_200_000,
            Timeframe::H4 => 14_400_000,
        }
    }

    /// OKX candle channel name for this timeframe, e.g. "candle30m".
    pub fn candle_channel(&self) -> String {
        format!("candle{}", self.label())
    }
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            multiplier: 1.5,
            max_attempts: 5,
        }
    }
}

/// Read-only configuration consumed by the connector and signal engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub ws_url: String,
    /// OKX instrument id, e.g. "BTC-USDT-SWAP".
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy: StrategyKind,
    pub bar_source: BarSource,

    pub ema_short: usize,
    pub ema_long: usize,
    pub bollinger_length: usize,
    pub bollinger_deviation: f64,
    pub supertrend_period: usize,
    pub supertrend_multiplier: f64,
    pub fractal_period: usize,

    pub price_history: usize,
    pub bar_history: usize,

    pub reconnect: ReconnectConfig,
    pub ping_interval: Duration,
    /// No inbound traffic for this long is treated as an unexpected close.
    pub idle_timeout: Duration,
    pub clock_skew_threshold: Duration,

    /// Buffer for the lossy tick/bar-update broadcast channel.
    pub market_buffer: usize,
    /// Buffer for completed-bar and signal broadcast channels.
    pub bar_buffer: usize,
    /// Minimum interval the signal consumer enforces between accepted trades.
    pub signal_cooldown: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            symbol: "BTC-USDT-SWAP".to_string(),
            timeframe: Timeframe::M30,
            strategy: StrategyKind::Combined,
            bar_source: BarSource::Candles,
            ema_short: 9,
            ema_long: 21,
            bollinger_length: 20,
            bollinger_deviation: 2.0,
            supertrend_period: 10,
            supertrend_multiplier: 3.0,
            fractal_period: 5,
            price_history: 200,
            bar_history: 200,
            reconnect: ReconnectConfig::default(),
            ping_interval: Duration::from_secs(29),
            idle_timeout: Duration::from_secs(60),
            clock_skew_threshold: Duration::from_millis(5000),
            market_buffer: 1000,
            bar_buffer: 10_000,
            signal_cooldown: Duration::from_secs(60),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env_var(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from `BOT_*` environment variables, falling back to
    /// defaults, then validate.
    pub fn from_env() -> Result<Self, BotError> {
        let defaults = Config::default();

        let timeframe = match env_var("BOT_TIMEFRAME") {
            Some(raw) => Timeframe::parse(&raw)
                .ok_or_else(|| BotError::Config(format!("unsupported timeframe: {raw}")))?,
            None => defaults.timeframe,
        };
        let strategy = match env_var("BOT_STRATEGY") {
            Some(raw) => StrategyKind::parse(&raw)
                .ok_or_else(|| BotError::Config(format!("unknown strategy: {raw}")))?,
            None => defaults.strategy,
        };
        let bar_source = match env_var("BOT_BAR_SOURCE") {
            Some(raw) => BarSource::parse(&raw)
                .ok_or_else(|| BotError::Config(format!("unknown bar source: {raw}")))?,
            None => defaults.bar_source,
        };

        let config = Config {
            ws_url: env_var("BOT_WS_URL").unwrap_or(defaults.ws_url),
            symbol: env_var("BOT_SYMBOL").unwrap_or(defaults.symbol),
            timeframe,
            strategy,
            bar_source,
            ema_short: env_parse("BOT_EMA_SHORT", defaults.ema_short),
            ema_long: env_parse("BOT_EMA_LONG", defaults.ema_long),
            bollinger_length: env_parse("BOT_BB_LENGTH", defaults.bollinger_length),
            bollinger_deviation: env_parse("BOT_BB_DEVIATION", defaults.bollinger_deviation),
            supertrend_period: env_parse("BOT_ST_PERIOD", defaults.supertrend_period),
            supertrend_multiplier: env_parse("BOT_ST_MULTIPLIER", defaults.supertrend_multiplier),
            fractal_period: env_parse("BOT_FRACTAL_PERIOD", defaults.fractal_period),
            price_history: env_parse("BOT_PRICE_HISTORY", defaults.price_history),
            bar_history: env_parse("BOT_BAR_HISTORY", defaults.bar_history),
            reconnect: ReconnectConfig {
                initial_delay: env_millis(
                    "BOT_RECONNECT_INITIAL_MS",
                    defaults.reconnect.initial_delay,
                ),
                multiplier: env_parse("BOT_RECONNECT_MULTIPLIER", defaults.reconnect.multiplier),
                max_attempts: env_parse(
                    "BOT_RECONNECT_MAX_ATTEMPTS",
                    defaults.reconnect.max_attempts,
                ),
            },
            ping_interval: env_millis("BOT_PING_INTERVAL_MS", defaults.ping_interval),
            idle_timeout: env_millis("BOT_IDLE_TIMEOUT_MS", defaults.idle_timeout),
            clock_skew_threshold: env_millis("BOT_CLOCK_SKEW_MS", defaults.clock_skew_threshold),
            market_buffer: env_parse("BOT_MARKET_BUFFER", defaults.market_buffer),
            bar_buffer: env_parse("BOT_BAR_BUFFER", defaults.bar_buffer),
            signal_cooldown: env_millis("BOT_SIGNAL_COOLDOWN_MS", defaults.signal_cooldown),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject invalid parameter combinations before any connection attempt.
    pub fn validate(&self) -> Result<(), BotError> {
        Url::parse(&self.ws_url)?;

        if self.symbol.is_empty() {
            return Err(BotError::Config("symbol must not be empty".to_string()));
        }
        if self.ema_short == 0 || self.ema_long == 0 {
            return Err(BotError::Config("EMA periods must be >= 1".to_string()));
        }
        if self.ema_short >= self.ema_long {
            return Err(BotError::Config(format!(
                "ema_short ({}) must be < ema_long ({})",
                self.ema_short, self.ema_long
            )));
        }
        if self.bollinger_length < 2 {
            return Err(BotError::Config(
                "bollinger_length must be >= 2".to_string(),
            ));
        }
        if self.bollinger_deviation <= 0.0 {
            return Err(BotError::Config(
                "bollinger_deviation must be > 0".to_string(),
            ));
        }
        if self.supertrend_period == 0 {
            return Err(BotError::Config(
                "supertrend_period must be >= 1".to_string(),
            ));
        }
        if self.supertrend_multiplier <= 0.0 {
            return Err(BotError::Config(
                "supertrend_multiplier must be > 0".to_string(),
            ));
        }
        if self.fractal_period < 3 || self.fractal_period % 2 == 0 {
            return Err(BotError::Config(format!(
                "fractal_period must be an odd number >= 3, got {}",
                self.fractal_period
            )));
        }
        if self.price_history == 0 || self.bar_history == 0 {
            return Err(BotError::Config(
                "history capacities must be >= 1".to_string(),
            ));
        }
        let longest_lookback = self.longest_lookback();
        if self.bar_history < longest_lookback {
            return Err(BotError::Config(format!(
                "bar_history ({}) must cover the strategy's longest lookback ({})",
                self.bar_history, longest_lookback
            )));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(BotError::Config(
                "reconnect max_attempts must be >= 1".to_string(),
            ));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(BotError::Config(
                "reconnect multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.reconnect.initial_delay.is_zero() {
            return Err(BotError::Config(
                "reconnect initial_delay must be > 0".to_string(),
            ));
        }
        if self.market_buffer == 0 || self.bar_buffer == 0 {
            return Err(BotError::Config("channel buffers must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Longest history any active strategy computation requires.
    pub fn longest_lookback(&self) -> usize {
        match self.strategy {
            StrategyKind::EmaCrossover => self.ema_long + 1,
            StrategyKind::Combined => (self.supertrend_period + 1)
                .max(self.bollinger_length)
                .max(self.fractal_period),
        }
    }
}
