use std::path::Path;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::strategies::BalancingStrategy;

/// Closed interval a value is drawn from uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    /// Draws a value; degenerate bounds return `min` without touching the RNG.
    pub fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..self.max)
    }

    fn problem(&self, what: &str) -> Option<String> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Some(format!("{what} must be finite"));
        }
        if self.min > self.max {
            return Some(format!("{what} min {} exceeds max {}", self.min, self.max));
        }
        if self.min < 0.0 {
            return Some(format!("{what} must not be negative"));
        }
        None
    }

    fn check(&self, what: &str) -> Result<()> {
        match self.problem(what) {
            Some(reason) => Err(SimError::invalid_config(reason)),
            None => Ok(()),
        }
    }

    /// Same rules as config validation, reported as a bad argument.
    pub(crate) fn check_argument(&self, what: &str) -> Result<()> {
        match self.problem(what) {
            Some(reason) => Err(SimError::invalid_argument(reason)),
            None => Ok(()),
        }
    }
}

/// Server power: a fixed power per server, or one range every server draws from.
///
/// `PerServer` comes first so that a two-element list is not read as a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerPower {
    PerServer(Vec<f64>),
    Range(Bounds),
}

impl ServerPower {
    pub fn bounds_for(&self, index: usize) -> Option<Bounds> {
        match self {
            ServerPower::Range(bounds) => Some(*bounds),
            ServerPower::PerServer(powers) => powers.get(index).copied().map(Bounds::fixed),
        }
    }
}

/// Slider and selector switches for an interactive front end. Parsed, never acted on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    pub visible: bool,
    pub show_rps_slider: bool,
    pub show_rps_variance_slider: bool,
    pub show_request_variance_slider: bool,
    pub show_server_power_slider: bool,
    pub show_num_servers_slider: bool,
    pub show_algorithm_selector: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rps: f64,
    pub rps_variance: f64,
    pub num_servers: usize,
    pub queue_max_length: usize,
    pub server_power: ServerPower,
    pub server_power_max: f64,
    pub request_size: f64,
    pub request_cost: Bounds,
    pub request_cost_max: f64,
    pub load_balancers: usize,
    pub algorithm: BalancingStrategy,
    pub travel_ms: f64,
    pub seed: Option<u64>,
    pub display: DisplayOptions,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rps: 5.0,
            rps_variance: 0.0,
            num_servers: 2,
            queue_max_length: 10,
            server_power: ServerPower::Range(Bounds::fixed(1.0)),
            server_power_max: 10.0,
            request_size: 10.0,
            request_cost: Bounds::fixed(50.0),
            request_cost_max: 1000.0,
            load_balancers: 1,
            algorithm: BalancingStrategy::RoundRobin,
            travel_ms: 0.0,
            seed: None,
            display: DisplayOptions {
                visible: true,
                ..Default::default()
            },
        }
    }
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rps.is_finite() || self.rps < 0.0 {
            return Err(SimError::invalid_config("rps must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&self.rps_variance) {
            return Err(SimError::invalid_config("rps_variance must be within [0, 1]"));
        }
        if self.load_balancers == 0 {
            return Err(SimError::invalid_config("at least one load balancer is required"));
        }
        if !self.travel_ms.is_finite() || self.travel_ms < 0.0 {
            return Err(SimError::invalid_config("travel_ms must be a non-negative number"));
        }
        self.request_cost.check("request_cost")?;
        match &self.server_power {
            ServerPower::Range(bounds) => bounds.check("server_power")?,
            ServerPower::PerServer(powers) => {
                if powers.len() < self.num_servers {
                    return Err(SimError::invalid_config(format!(
                        "server_power lists {} powers for {} servers",
                        powers.len(),
                        self.num_servers
                    )));
                }
                for &power in powers {
                    Bounds::fixed(power).check("server_power")?;
                }
            }
        }
        Ok(())
    }
}
