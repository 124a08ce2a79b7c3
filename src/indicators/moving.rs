//! Windowed moving statistics over closing prices.

/// Simple moving average over the trailing `length` values.
pub fn sma(values: &[f64], length: usize) -> Option<f64> {
    if length == 0 || values.len() < length {
        return None;
    }
    let window = &values[values.len() - length..];
    Some(window.iter().sum::<f64>() / length as f64)
}

/// Population standard deviation over the trailing `length` values.
pub fn std_dev(values: &[f64], length: usize) -> Option<f64> {
    if length == 0 || values.len() < length {
        return None;
    }
    let window = &values[values.len() - length..];
    let mean = window.iter().sum::<f64>() / length as f64;
    let variance = window
        .iter()
        .map(|value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / length as f64;
    Some(variance.sqrt())
}

/// Exponential moving average with smoothing factor `2 / (length + 1)`,
/// seeded by the SMA of the first `length` values and folded forward over
/// the remainder of the series.
pub fn ema(values: &[f64], length: usize) -> Option<f64> {
    if length == 0 || values.len() < length {
        return None;
    }
    let alpha = 2.0 / (length as f64 + 1.0);
    let mut value = values[..length].iter().sum::<f64>() / length as f64;
    for price in &values[length..] {
        value = alpha * price + (1.0 - alpha) * value;
    }
    Some(value)
}

/// Bollinger Bands: SMA ± deviation · population std dev.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

pub fn bollinger(values: &[f64], length: usize, deviation: f64) -> Option<BollingerBands> {
    let middle = sma(values, length)?;
    let sd = std_dev(values, length)?;
    Some(BollingerBands {
        upper: middle + deviation * sd,
        middle,
        lower: middle - deviation * sd,
    })
}
