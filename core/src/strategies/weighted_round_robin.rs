use rand::RngCore;

use crate::components::request::Request;
use crate::strategies::{RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

/// Position in a weighted rotation: which server is current and how many
/// consecutive requests it has received.
#[derive(Debug, Default, Clone)]
pub(crate) struct Rotation {
    current: usize,
    sent_to_current: u32,
}

impl Rotation {
    pub(crate) fn current<'a>(&mut self, servers: &'a [ServerInfo]) -> Option<&'a ServerInfo> {
        if self.current >= servers.len() {
            self.current = 0;
        }
        servers.get(self.current)
    }

    /// Sends one request to the current server, first moving on to the next
    /// server if the current one has used up `quota`.
    pub(crate) fn pick(&mut self, servers: &[ServerInfo], quota: u32) -> Option<AgentId> {
        self.current(servers)?;
        if self.sent_to_current >= quota {
            self.current = (self.current + 1) % servers.len();
            self.sent_to_current = 0;
        }
        self.sent_to_current += 1;
        Some(servers[self.current].id)
    }
}

/// Gives each server a run of `ceil(power / min_power)` consecutive requests.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    rotation: Rotation,
}

impl RoutingStrategy for WeightedRoundRobin {
    fn name(&self) -> &'static str {
        "weighted-round-robin"
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        _rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        let min_power = servers
            .iter()
            .map(|s| s.power)
            .fold(f64::INFINITY, f64::min);
        let server = self.rotation.current(servers)?;

        let quota = if min_power > 0.0 && min_power.is_finite() {
            (server.power / min_power).ceil() as u32
        } else {
            1
        };
        self.rotation.pick(servers, quota)
    }
}
