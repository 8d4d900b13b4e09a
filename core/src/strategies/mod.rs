use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::components::request::Request;
use crate::components::server::Server;
use crate::error::SimError;
use crate::traits::{Agent, AgentId};

pub mod dynamic_weighted_round_robin;
pub mod least_connections;
pub mod peak_ewma;
pub mod random;
pub mod round_robin;
pub mod weighted_random;
pub mod weighted_round_robin;

pub use dynamic_weighted_round_robin::DynamicWeightedRoundRobin;
pub use least_connections::LeastConnections;
pub use peak_ewma::PeakEwma;
pub use random::Random;
pub use round_robin::RoundRobin;
pub use weighted_random::WeightedRandom;
pub use weighted_round_robin::WeightedRoundRobin;

/// What a strategy may see of a candidate server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerInfo {
    pub id: AgentId,
    pub power: f64,
}

impl From<&Server> for ServerInfo {
    fn from(server: &Server) -> Self {
        Self {
            id: server.id(),
            power: server.power(),
        }
    }
}

/// Live requests per destination server.
pub type ConnectionCounts = HashMap<AgentId, u32>;

/// Policy choosing the destination of each new request.
pub trait RoutingStrategy {
    fn name(&self) -> &'static str;

    /// Picks one of `servers`. Returns `None` only when `servers` is empty.
    fn choose_server(
        &mut self,
        request: &Request,
        servers: &[ServerInfo],
        rng: &mut dyn RngCore,
    ) -> Option<AgentId>;

    /// Feedback for every routed request once it is served, dropped or abandoned.
    fn on_request_destroyed(&mut self, _request: &Request) {}

    /// Rebuilds internal state when attached to a load balancer, from the
    /// requests currently in flight.
    fn init(&mut self, _in_flight: &ConnectionCounts) {}

    fn server_label(&self, _server: AgentId) -> Option<String> {
        None
    }
}

macro_rules! register_strategies {
    ($($name:literal => $variant:ident),* $(,)?) => {
        /// Selector over every routing strategy, named as in configuration files.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum BalancingStrategy {
            $($variant),*
        }

        impl BalancingStrategy {
            pub const ALL: &'static [BalancingStrategy] = &[$(BalancingStrategy::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $(BalancingStrategy::$variant => $name),*
                }
            }

            pub fn build(self) -> Box<dyn RoutingStrategy> {
                match self {
                    $(BalancingStrategy::$variant => Box::new($variant::default())),*
                }
            }
        }

        impl FromStr for BalancingStrategy {
            type Err = SimError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $($name => Ok(BalancingStrategy::$variant),)*
                    other => Err(SimError::UnknownAlgorithm {
                        name: other.to_string(),
                    }),
                }
            }
        }
    };
}

register_strategies!(
    "round-robin" => RoundRobin,
    "random" => Random,
    "weighted-random" => WeightedRandom,
    "weighted-round-robin" => WeightedRoundRobin,
    "dynamic-weighted-round-robin" => DynamicWeightedRoundRobin,
    "least-connections" => LeastConnections,
    "peak-exponentially-weighted-moving-average" => PeakEwma,
);

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for BalancingStrategy {
    type Error = SimError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<BalancingStrategy> for String {
    fn from(strategy: BalancingStrategy) -> Self {
        strategy.name().to_string()
    }
}

/// Builds the strategy registered under `name`.
pub fn create_strategy(name: &str) -> Result<Box<dyn RoutingStrategy>, SimError> {
    Ok(name.parse::<BalancingStrategy>()?.build())
}
