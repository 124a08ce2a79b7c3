//! Indicator calculations over bounded history slices.
//!
//! Every function returns `None` rather than computing on too-short input,
//! and none mutates the series passed in. The only carried state in the
//! module is the Supertrend continuation memo.

pub mod atr;
pub mod fractal;
pub mod moving;
pub mod supertrend;

pub use atr::atr;
pub use fractal::{fractal_trend, FractalTrend};
pub use moving::{bollinger, ema, sma, std_dev, BollingerBands};
pub use supertrend::{Supertrend, SupertrendSnapshot, Trend};
