use rand::{Rng, RngCore};

use crate::components::request::Request;
use crate::strategies::{RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

/// Picks a server with probability proportional to its drawn power.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl RoutingStrategy for WeightedRandom {
    fn name(&self) -> &'static str {
        "weighted-random"
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        let total: f64 = servers.iter().map(|s| s.power).sum();
        let mut remaining = rng.gen::<f64>() * total;
        for server in servers {
            remaining -= server.power;
            if remaining <= 0.0 {
                return Some(server.id);
            }
        }
        // Float rounding can leave a sliver past the last server.
        servers.last().map(|s| s.id)
    }
}
