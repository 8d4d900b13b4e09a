pub mod analytics;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod stats;
pub mod strategies;
pub mod traits;

pub use analytics::{MetricPoint, MetricsCollector};
pub use components::load_balancer::{LoadBalancer, LoadBalancerConfig};
pub use components::queue::RequestQueue;
pub use components::request::{Request, RequestRecord};
pub use components::server::Server;
pub use config::{Bounds, ServerPower, SimulationConfig};
pub use engine::Simulation;
pub use error::{Result, SimError};
pub use stats::{PercentileCalculator, Pewma};
pub use strategies::{create_strategy, BalancingStrategy, RoutingStrategy, ServerInfo};
pub use traits::{Agent, AgentId, AgentKind};

/// Tick length of a 60 Hz host loop, in milliseconds.
pub const DEFAULT_TICK_MS: f64 = 1000.0 / 60.0;
