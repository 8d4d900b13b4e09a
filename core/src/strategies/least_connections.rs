use rand::{Rng, RngCore};

use crate::components::request::Request;
use crate::strategies::{ConnectionCounts, RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

/// Routes to the server with the fewest open requests, breaking ties at random.
#[derive(Debug, Default)]
pub struct LeastConnections {
    connections: ConnectionCounts,
}

impl LeastConnections {
    pub fn connections(&self, server: AgentId) -> u32 {
        self.connections.get(&server).copied().unwrap_or(0)
    }
}

impl RoutingStrategy for LeastConnections {
    fn name(&self) -> &'static str {
        "least-connections"
    }

    fn init(&mut self, in_flight: &ConnectionCounts) {
        self.connections = in_flight.clone();
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        let lowest = servers.iter().map(|s| self.connections(s.id)).min()?;
        let tied: Vec<AgentId> = servers
            .iter()
            .filter(|s| self.connections(s.id) == lowest)
            .map(|s| s.id)
            .collect();

        let chosen = tied[rng.gen_range(0..tied.len())];
        *self.connections.entry(chosen).or_insert(0) += 1;
        Some(chosen)
    }

    fn on_request_destroyed(&mut self, request: &Request) {
        if let Some(count) = request
            .destination()
            .and_then(|server| self.connections.get_mut(&server))
        {
            *count = count.saturating_sub(1);
        }
    }
}
