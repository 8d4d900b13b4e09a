use rand::RngCore;

use crate::components::request::Request;
use crate::strategies::{RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

/// Cycles through the servers one request at a time.
#[derive(Debug, Default)]
pub struct RoundRobin {
    current: usize,
}

impl RoutingStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        _rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        if self.current >= servers.len() {
            self.current = 0;
        }
        let server = servers.get(self.current)?;
        self.current += 1;
        Some(server.id)
    }
}
