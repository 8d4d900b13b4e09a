use std::collections::VecDeque;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

use crate::components::request::Request;
use crate::error::{Result, SimError};

/// Simulation time between two history points.
const SAMPLE_STEP_MS: f64 = 200.0;
const RATE_SMOOTHING: f64 = 0.1;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct MetricPoint {
    pub sim_time_ms: f64,
    pub p99_ms: f64,
    pub served_rps: f64,
    pub dropped_rps: f64,
}

/// Telemetry consumer fed with finished requests through
/// `Simulation::on_request_destroyed`. Keeps totals and a rolling history of
/// p99 latency and smoothed served/dropped rates.
pub struct MetricsCollector {
    pub history: VecDeque<MetricPoint>,
    pub max_points: usize,
    window: Histogram<u64>,
    served_total: u64,
    dropped_total: u64,
    abandoned_total: u64,
    last_sample_time_ms: f64,
    last_served: u64,
    last_dropped: u64,
    current_served_rps: f64,
    current_dropped_rps: f64,
}

impl MetricsCollector {
    pub fn new(max_points: usize) -> Result<Self> {
        Ok(Self {
            history: VecDeque::with_capacity(max_points),
            max_points,
            window: Histogram::new(3).map_err(|e| SimError::Metrics(format!("{e:?}")))?,
            served_total: 0,
            dropped_total: 0,
            abandoned_total: 0,
            last_sample_time_ms: 0.0,
            last_served: 0,
            last_dropped: 0,
            current_served_rps: 0.0,
            current_dropped_rps: 0.0,
        })
    }

    pub fn record(&mut self, request: &Request) {
        if request.dropped {
            self.dropped_total += 1;
        } else if request.served.is_some() {
            self.served_total += 1;
            self.window.saturating_record(request.age.max(0.0).round() as u64);
        } else {
            self.abandoned_total += 1;
        }
    }

    /// Appends a history point if at least one sample step has passed since
    /// the previous one.
    pub fn update(&mut self, now_ms: f64) {
        if now_ms < self.last_sample_time_ms + SAMPLE_STEP_MS {
            return;
        }

        let p99_ms = if self.window.len() == 0 {
            0.0
        } else {
            self.window.value_at_quantile(0.99) as f64
        };

        let delta_s = (now_ms - self.last_sample_time_ms) / 1000.0;
        let raw_served = (self.served_total - self.last_served) as f64 / delta_s;
        let raw_dropped = (self.dropped_total - self.last_dropped) as f64 / delta_s;
        self.current_served_rps =
            self.current_served_rps * (1.0 - RATE_SMOOTHING) + raw_served * RATE_SMOOTHING;
        self.current_dropped_rps =
            self.current_dropped_rps * (1.0 - RATE_SMOOTHING) + raw_dropped * RATE_SMOOTHING;

        self.history.push_back(MetricPoint {
            sim_time_ms: now_ms,
            p99_ms,
            served_rps: self.current_served_rps,
            dropped_rps: self.current_dropped_rps,
        });
        if self.history.len() > self.max_points {
            self.history.pop_front();
        }

        self.window.reset();
        self.last_sample_time_ms = now_ms;
        self.last_served = self.served_total;
        self.last_dropped = self.dropped_total;
    }

    pub fn served_total(&self) -> u64 {
        self.served_total
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    pub fn abandoned_total(&self) -> u64 {
        self.abandoned_total
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.window.reset();
        self.served_total = 0;
        self.dropped_total = 0;
        self.abandoned_total = 0;
        self.last_sample_time_ms = 0.0;
        self.last_served = 0;
        self.last_dropped = 0;
        self.current_served_rps = 0.0;
        self.current_dropped_rps = 0.0;
    }
}
