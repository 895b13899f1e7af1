//! Trailing-window indicators over a close-price series. Each function
//! returns one value per input row; the first `period - 1` rows are `None`
//! because the window is not yet full.

/// Simple moving average over a trailing window.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut result = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let window = &values[i + 1 - period..=i];
            result.push(Some(window.iter().sum::<f64>() / period as f64));
        }
    }
    result
}

/// Exponential moving average with span `period`. The first defined value,
/// at index `period - 1`, is seeded with the simple average of the initial
/// window; later values use the recursive form with `k = 2 / (period + 1)`.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 || values.len() < period {
        return vec![None; values.len()];
    }

    let mut result = vec![None; period - 1];
    let k = 2.0 / (period as f64 + 1.0);

    let seed = values[..period].iter().sum::<f64>() / period as f64;
    result.push(Some(seed));

    let mut prev = seed;
    for value in values.iter().skip(period) {
        let next = value * k + prev * (1.0 - k);
        result.push(Some(next));
        prev = next;
    }
    result
}

/// Rolling sample standard deviation (denominator `period - 1`) over a
/// trailing window.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }

    let mut result = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else {
            let window = &values[i + 1 - period..=i];
            let mean = window.iter().sum::<f64>() / period as f64;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period as f64 - 1.0);
            result.push(Some(variance.sqrt()));
        }
    }
    result
}
