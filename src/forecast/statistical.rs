use rand::rngs::StdRng;
use rand::Rng;

use crate::config::NOISE_SCALE;

/// 3-point moving average, endpoints left untouched. Interior point i
/// becomes the mean of points i-1, i, i+1.
pub fn smooth_series(values: &[f64]) -> Vec<f64> {
    if values.len() < 3 {
        return values.to_vec();
    }
    let mut out = values.to_vec();
    for i in 1..values.len() - 1 {
        out[i] = (values[i - 1] + values[i] + values[i + 1]) / 3.0;
    }
    out
}

/// Level, direction and spread of a smoothed history window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalModel {
    pub mean: f64,
    pub trend: f64,
    pub volatility: f64,
}

impl StatisticalModel {
    /// Fit on a series. Trend is the per-step slope between the endpoints;
    /// volatility is the population standard deviation. None on an empty
    /// series, there is nothing to fit.
    pub fn fit(series: &[f64]) -> Option<Self> {
        if series.is_empty() {
            return None;
        }
        let n = series.len() as f64;
        let mean = series.iter().sum::<f64>() / n;
        let trend = (series[series.len() - 1] - series[0]) / n;
        let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            trend,
            volatility: variance.sqrt(),
        })
    }

    /// Project `horizon` hourly steps ahead: linear trend plus a 24-hour
    /// sinusoid scaled by volatility plus uniform noise. A zero-volatility
    /// series projects with no cycle and no noise, so constant history gives
    /// a constant forecast.
    pub fn project(&self, horizon: usize, rng: &mut StdRng) -> Vec<f64> {
        (0..horizon)
            .map(|i| {
                let step = (i + 1) as f64;
                let cycle = (i as f64 * std::f64::consts::PI / 12.0).sin();
                let noise = (rng.gen::<f64>() - 0.5) * NOISE_SCALE * self.volatility;
                self.mean + self.trend * step + self.volatility * cycle + noise
            })
            .collect()
    }
}
