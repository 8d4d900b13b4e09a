use std::collections::HashMap;

use rand::RngCore;

use crate::components::request::Request;
use crate::stats::{Pewma, DEFAULT_PEAK_MS};
use crate::strategies::{ConnectionCounts, RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

const SMOOTHING: f64 = 0.2;
/// Latency charged to a server for every request it drops.
pub const DROP_PENALTY_MS: f64 = 5000.0;

/// Routes to the server minimising `(open requests + 1) * peak latency`.
#[derive(Debug, Default)]
pub struct PeakEwma {
    connections: ConnectionCounts,
    estimators: HashMap<AgentId, Pewma>,
}

impl PeakEwma {
    pub fn connections(&self, server: AgentId) -> u32 {
        self.connections.get(&server).copied().unwrap_or(0)
    }

    pub fn peak(&self, server: AgentId) -> Option<f64> {
        self.estimators.get(&server).and_then(Pewma::peak)
    }

    fn score(&self, server: AgentId) -> f64 {
        let peak = self.peak(server).unwrap_or(DEFAULT_PEAK_MS);
        (self.connections(server) + 1) as f64 * peak
    }
}

impl RoutingStrategy for PeakEwma {
    fn name(&self) -> &'static str {
        "peak-exponentially-weighted-moving-average"
    }

    fn init(&mut self, in_flight: &ConnectionCounts) {
        self.connections = in_flight.clone();
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        _rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        let mut chosen = servers.first()?.id;
        let mut lowest = self.score(chosen);
        for server in &servers[1..] {
            let score = self.score(server.id);
            if score < lowest {
                chosen = server.id;
                lowest = score;
            }
        }
        *self.connections.entry(chosen).or_insert(0) += 1;
        Some(chosen)
    }

    fn on_request_destroyed(&mut self, request: &Request) {
        let Some(server) = request.destination() else {
            return;
        };
        if let Some(count) = self.connections.get_mut(&server) {
            *count = count.saturating_sub(1);
        }
        let sample = if request.dropped {
            DROP_PENALTY_MS
        } else {
            request.age
        };
        self.estimators
            .entry(server)
            .or_insert_with(|| Pewma::new(SMOOTHING))
            .update(sample);
    }
}
