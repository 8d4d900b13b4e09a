use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::components::request::Request;
use crate::config::Bounds;
use crate::engine::Simulation;
use crate::lifecycle::{self, Lifecycle};
use crate::strategies::{BalancingStrategy, ConnectionCounts, RoutingStrategy, ServerInfo};
use crate::traits::{Agent, AgentId, AgentKind};

pub type RequestObserver = Box<dyn FnMut(&Request)>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub rps: f64,
    /// Fractional jitter applied to each inter-arrival gap.
    pub rps_variance: f64,
    pub request_cost: Bounds,
    pub request_size: f64,
    pub travel_ms: f64,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            rps: 5.0,
            rps_variance: 0.0,
            request_cost: Bounds::fixed(10.0),
            request_size: 10.0,
            travel_ms: 0.0,
        }
    }
}

/// Strategy plus completion observers. Shared with the destroy hook of every
/// request this load balancer routes, so feedback reaches whichever strategy
/// is active when the request finishes.
struct Router {
    strategy: Box<dyn RoutingStrategy>,
    observers: Vec<RequestObserver>,
}

impl Router {
    fn notify(&mut self, request: &Request) {
        self.strategy.on_request_destroyed(request);
        for observer in &mut self.observers {
            observer(request);
        }
    }
}

/// Front door of the pipeline: generates requests at a jittered rate and
/// routes each one to a server through the active strategy.
pub struct LoadBalancer {
    lifecycle: Lifecycle<LoadBalancer>,
    pub name: String,
    pub config: LoadBalancerConfig,
    servers: Vec<AgentId>,
    ms_until_next_request: f64,
    router: Rc<RefCell<Router>>,
    pub sent: u64,
}

impl LoadBalancer {
    pub fn new(
        id: AgentId,
        name: &str,
        config: LoadBalancerConfig,
        strategy: BalancingStrategy,
        in_flight: &ConnectionCounts,
    ) -> Self {
        let mut strategy = strategy.build();
        strategy.init(in_flight);
        Self {
            lifecycle: Lifecycle::new(id),
            name: name.to_string(),
            config,
            servers: Vec::new(),
            ms_until_next_request: 0.0,
            router: Rc::new(RefCell::new(Router {
                strategy,
                observers: Vec::new(),
            })),
            sent: 0,
        }
    }

    pub fn servers(&self) -> &[AgentId] {
        &self.servers
    }

    pub fn add_server(&mut self, server: AgentId) {
        if !self.servers.contains(&server) {
            self.servers.push(server);
        }
    }

    pub fn remove_server(&mut self, server: AgentId) {
        self.servers.retain(|&id| id != server);
    }

    pub(crate) fn retain_servers(&mut self, keep: impl Fn(AgentId) -> bool) {
        self.servers.retain(|&id| keep(id));
    }

    pub fn strategy_name(&self) -> &'static str {
        self.router.borrow().strategy.name()
    }

    /// Installs a new strategy and rebuilds its state from `in_flight` before
    /// any further routing decision.
    pub fn set_strategy(
        &mut self,
        strategy: Box<dyn RoutingStrategy>,
        in_flight: &ConnectionCounts,
    ) {
        let mut router = self.router.borrow_mut();
        router.strategy = strategy;
        router.strategy.init(in_flight);
        log::debug!(
            "[{}] strategy {} initialised with {:?}",
            self.id(),
            router.strategy.name(),
            in_flight
        );
    }

    /// Registers an observer called with every request this load balancer
    /// routed, once it is served, dropped or abandoned.
    pub fn on_request_destroyed(&mut self, observer: impl FnMut(&Request) + 'static) {
        self.router.borrow_mut().observers.push(Box::new(observer));
    }

    pub fn server_label(&self, server: AgentId) -> Option<String> {
        self.router.borrow().strategy.server_label(server)
    }

    pub fn on_destroy(&mut self, hook: impl FnMut(&LoadBalancer) + 'static) {
        self.lifecycle.on_destroy(hook);
    }

    /// Creates one request and routes it. No-op without live servers.
    pub fn send_request(&mut self, sim: &mut Simulation) -> Option<AgentId> {
        let candidates: Vec<ServerInfo> = self
            .servers
            .iter()
            .filter_map(|&id| sim.server(id))
            .filter(|server| !server.is_destroyed())
            .map(ServerInfo::from)
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let id = sim.next_id();
        let cost = self.config.request_cost.sample(sim.rng());
        let mut request = Request::new(id, cost, sim.time_ms())
            .with_source(self.id())
            .with_size(self.config.request_size);

        let chosen = self
            .router
            .borrow_mut()
            .strategy
            .choose_server(&request, &candidates, sim.rng());
        let target = chosen?;

        let router = Rc::clone(&self.router);
        request.on_destroy(move |r| router.borrow_mut().notify(r));

        if let Err(err) = request.set_destination(target, self.config.travel_ms) {
            log::warn!("[{}] {}", self.id(), err);
            return None;
        }
        self.sent += 1;
        if self.config.travel_ms <= 0.0 {
            sim.deliver(&mut request);
        }
        sim.insert_request(request);
        Some(id)
    }
}

impl Agent for LoadBalancer {
    fn id(&self) -> AgentId {
        self.lifecycle.id()
    }

    fn kind(&self) -> AgentKind {
        AgentKind::LoadBalancer
    }

    fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }

    fn destroy(&mut self) {
        if let Some(hooks) = self.lifecycle.begin_destroy() {
            log::trace!("[{}] destroy()", self.id());
            lifecycle::fire(hooks, self);
        }
    }

    fn update(&mut self, delta_ms: f64, sim: &mut Simulation) {
        if self.is_destroyed() || self.config.rps <= 0.0 {
            return;
        }
        self.ms_until_next_request -= delta_ms;
        if self.ms_until_next_request <= 0.0 {
            let ms_per_request = 1000.0 / self.config.rps;
            let variance = self.config.rps_variance;
            let jitter = Bounds::new(1.0 - variance, 1.0 + variance);
            self.ms_until_next_request = ms_per_request * jitter.sample(sim.rng());
            self.send_request(sim);
        }
    }
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("strategy", &self.strategy_name())
            .field("servers", &self.servers)
            .field("config", &self.config)
            .finish()
    }
}
