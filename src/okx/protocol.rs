//! OKX v5 public WebSocket wire format.
//!
//! See docs: <https://www.okx.com/docs-v5/en/#websocket-api-public-channel>

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// OKX real-time ticker channel.
pub const TICKERS_CHANNEL: &str = "tickers";

/// Outbound subscription request:
/// `{"op":"subscribe","args":[{"channel":...,"instId":...}]}`.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub op: &'static str,
    pub args: Vec<SubscriptionArg>,
}

impl SubscribeRequest {
    pub fn new(args: Vec<SubscriptionArg>) -> Self {
        Self {
            op: "subscribe",
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionArg {
    pub channel: String,
    #[serde(rename = "instId")]
    pub inst_id: String,
}

impl SubscriptionArg {
    pub fn new(channel: impl Into<String>, inst_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: inst_id.into(),
        }
    }
}

/// Any inbound JSON frame: either a control event or a data push.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Event(EventFrame),
    Data(DataFrame),
}

/// `{"event":"subscribe"|"error",...}` control frames acknowledging or
/// rejecting a subscription.
#[derive(Debug, Deserialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(default)]
    pub arg: Option<SubscriptionArg>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// `{"arg":{...},"data":[...]}` push frames. The payload shape depends on the
/// channel, so it is decoded in a second step.
#[derive(Debug, Deserialize)]
pub struct DataFrame {
    pub arg: SubscriptionArg,
    pub data: serde_json::Value,
}

/// One `tickers` element. OKX serializes all numbers as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerData {
    /// Last traded price.
    #[serde(deserialize_with = "de_f64_str")]
    pub last: f64,
    /// 24h rolling volume in contracts.
    #[serde(rename = "vol24h", deserialize_with = "de_f64_str")]
    pub vol24h: f64,
    /// Server event time, epoch millis.
    #[serde(deserialize_with = "de_millis_str")]
    pub ts: DateTime<Utc>,
}

/// One `candle{tf}` element: fixed-order `[ts, open, high, low, close, vol]`
/// (later OKX fields, if present, are ignored).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleData {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl<'de> Deserialize<'de> for CandleData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let fields = Vec::<String>::deserialize(deserializer)?;
        if fields.len() < 6 {
            return Err(de::Error::invalid_length(
                fields.len(),
                &"at least 6 candle fields",
            ));
        }
        let number = |index: usize| -> Result<f64, D::Error> {
            fields[index]
                .parse::<f64>()
                .map_err(|_| de::Error::custom(format!("invalid number in candle field {index}")))
        };
        let ts_ms = fields[0]
            .parse::<i64>()
            .map_err(|_| de::Error::custom("invalid candle timestamp"))?;
        Ok(Self {
            ts: millis_to_utc::<D>(ts_ms)?,
            open: number(1)?,
            high: number(2)?,
            low: number(3)?,
            close: number(4)?,
            volume: number(5)?,
        })
    }
}

fn millis_to_utc<'de, D>(ms: i64) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {ms}")))
}

fn de_f64_str<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse::<f64>()
        .map_err(|_| de::Error::custom(format!("invalid decimal string: {raw}")))
}

fn de_millis_str<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let ms = raw
        .parse::<i64>()
        .map_err(|_| de::Error::custom(format!("invalid millis string: {raw}")))?;
    millis_to_utc::<D>(ms)
}
