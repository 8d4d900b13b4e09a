use std::collections::VecDeque;

use crate::error::{Result, SimError};

/// Peak value assumed before an estimator has seen any sample.
pub const DEFAULT_PEAK_MS: f64 = 1000.0;

const PEWMA_HISTORY: usize = 100;

/// Unordered multiset of samples answering interpolated percentile queries.
#[derive(Debug, Clone, Default)]
pub struct PercentileCalculator {
    samples: Vec<f64>,
}

impl PercentileCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64) {
        self.samples.push(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Percentile `p` of the samples, with `p` strictly inside `(0, 100)`.
    ///
    /// Ranks are fractional (`p/100 * (n-1)`) and the result is linearly
    /// interpolated between the two neighbouring samples.
    pub fn percentile(&self, p: f64) -> Result<f64> {
        if !(p > 0.0 && p < 100.0) {
            return Err(SimError::invalid_argument(format!(
                "percentile must be between 0 and 100, got {p}"
            )));
        }
        if self.samples.is_empty() {
            return Err(SimError::NoSamples);
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let idx = (p / 100.0) * (sorted.len() - 1) as f64;
        let floor = idx.floor();
        let ceil = idx.ceil();
        if floor == ceil {
            return Ok(sorted[floor as usize]);
        }
        let lower = sorted[floor as usize] * (ceil - idx);
        let upper = sorted[ceil as usize] * (idx - floor);
        Ok(lower + upper)
    }
}

/// Peak exponentially weighted moving average.
///
/// Follows samples with an ordinary EWMA, but whenever a sample exceeds the
/// previous peak the older history is scaled down and the newest estimate
/// scaled up, so the estimator jumps to new peaks and decays from them slowly.
#[derive(Debug, Clone)]
pub struct Pewma {
    alpha: f64,
    beta: f64,
    peaks: VecDeque<f64>,
}

impl Pewma {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            beta: alpha / 4.0,
            peaks: VecDeque::with_capacity(PEWMA_HISTORY + 1),
        }
    }

    pub fn update(&mut self, value: f64) {
        let prev_peak = self.peak().unwrap_or(DEFAULT_PEAK_MS);
        let ewma_peak = self.alpha * value + (1.0 - self.alpha) * prev_peak;

        self.peaks.push_back(ewma_peak);
        if self.peaks.len() > PEWMA_HISTORY {
            self.peaks.pop_front();
        }

        if value > prev_peak {
            let weight_delta = self.beta * (ewma_peak / prev_peak);
            let newest = self.peaks.len() - 1;
            for (i, peak) in self.peaks.iter_mut().enumerate() {
                if i == newest {
                    *peak *= 1.0 + weight_delta;
                } else {
                    *peak *= 1.0 - weight_delta;
                }
            }
        }
    }

    /// Most recent estimate, `None` until the first sample.
    pub fn peak(&self) -> Option<f64> {
        self.peaks.back().copied()
    }

    pub fn history_len(&self) -> usize {
        self.peaks.len()
    }
}
