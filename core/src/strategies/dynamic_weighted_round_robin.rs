use std::collections::{HashMap, VecDeque};

use rand::RngCore;

use crate::components::request::Request;
use crate::strategies::weighted_round_robin::Rotation;
use crate::strategies::{RoutingStrategy, ServerInfo};
use crate::traits::AgentId;

/// Latency samples kept per server.
const LATENCY_WINDOW: usize = 3;
/// Largest run of consecutive requests a server can earn.
const QUOTA_RANGE: u32 = 3;

/// Weighted round robin where weights come from observed service latency
/// instead of configured power: servers that recently served faster than
/// their peers get longer runs.
#[derive(Debug, Default)]
pub struct DynamicWeightedRoundRobin {
    rotation: Rotation,
    latencies: HashMap<AgentId, VecDeque<f64>>,
    averages: HashMap<AgentId, f64>,
}

impl DynamicWeightedRoundRobin {
    pub fn average_latency(&self, server: AgentId) -> Option<f64> {
        self.averages.get(&server).copied()
    }

    fn quota(&self, server: AgentId, servers: &[ServerInfo]) -> u32 {
        let Some(&avg) = self.averages.get(&server) else {
            return 1;
        };
        let known = servers.iter().filter_map(|s| self.averages.get(&s.id).copied());
        let (min_avg, max_avg) = known.fold((f64::INFINITY, 0.0_f64), |(lo, hi), a| {
            (lo.min(a), hi.max(a))
        });
        if max_avg <= 0.0 {
            return QUOTA_RANGE;
        }
        let penalty = (((avg - min_avg) / max_avg) * QUOTA_RANGE as f64).ceil();
        (QUOTA_RANGE as f64 - penalty).max(0.0) as u32
    }
}

impl RoutingStrategy for DynamicWeightedRoundRobin {
    fn name(&self) -> &'static str {
        "dynamic-weighted-round-robin"
    }

    fn choose_server(
        &mut self,
        _request: &Request,
        servers: &[ServerInfo],
        _rng: &mut dyn RngCore,
    ) -> Option<AgentId> {
        let current = self.rotation.current(servers)?.id;
        let quota = self.quota(current, servers);
        self.rotation.pick(servers, quota)
    }

    fn on_request_destroyed(&mut self, request: &Request) {
        if request.dropped {
            return;
        }
        let Some(server) = request.destination() else {
            return;
        };
        let history = self.latencies.entry(server).or_default();
        history.push_back(request.time_spent_processing_ms);
        if history.len() > LATENCY_WINDOW {
            history.pop_front();
        }
        let avg = history.iter().sum::<f64>() / history.len() as f64;
        self.averages.insert(server, avg);
    }

    fn server_label(&self, server: AgentId) -> Option<String> {
        self.average_latency(server)
            .map(|avg| format!("{:.1}s", avg / 1000.0))
    }
}
