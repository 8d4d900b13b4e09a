use rand::{Rng, RngCore};

use crate::components::request::Request;
use crate::strategies::{RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

#[derive(Debug, Default)]
pub struct Random;

impl RoutingStrategy for Random {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        if servers.is_empty() {
            return None;
        }
        Some(servers[rng.gen_range(0..servers.len())].id)
    }
}
