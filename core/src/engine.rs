use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::components::load_balancer::{LoadBalancer, LoadBalancerConfig};
use crate::components::request::Request;
use crate::components::server::Server;
use crate::config::{Bounds, SimulationConfig};
use crate::error::{Result, SimError};
use crate::lifecycle::IdAllocator;
use crate::strategies::{BalancingStrategy, ConnectionCounts, RoutingStrategy};
use crate::traits::{Agent, AgentId, AgentKind};

type Store<A> = HashMap<AgentId, A>;

fn requests_of(sim: &mut Simulation) -> &mut Store<Request> {
    &mut sim.requests
}

fn servers_of(sim: &mut Simulation) -> &mut Store<Server> {
    &mut sim.servers
}

fn load_balancers_of(sim: &mut Simulation) -> &mut Store<LoadBalancer> {
    &mut sim.load_balancers
}

fn check_rps(rps: f64) -> Result<()> {
    if !rps.is_finite() || rps < 0.0 {
        return Err(SimError::invalid_argument(format!("rps must be non-negative, got {rps}")));
    }
    Ok(())
}

fn check_rps_variance(variance: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&variance) {
        return Err(SimError::invalid_argument(format!(
            "rps variance must be within [0, 1], got {variance}"
        )));
    }
    Ok(())
}

/// Owns every live agent and advances them in discrete ticks.
///
/// Each tick first removes agents destroyed since the previous one, then
/// updates the rest in the order they were added. Agents added during a tick
/// are updated in that same tick.
pub struct Simulation {
    time_ms: f64,
    ids: IdAllocator,
    rng: StdRng,
    live: Vec<(AgentId, AgentKind)>,
    requests: Store<Request>,
    servers: Store<Server>,
    load_balancers: Store<LoadBalancer>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            time_ms: 0.0,
            ids: IdAllocator::default(),
            rng,
            live: Vec::new(),
            requests: HashMap::new(),
            servers: HashMap::new(),
            load_balancers: HashMap::new(),
        }
    }

    /// Builds the load balancers, then the servers, attaching every server to
    /// every load balancer.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut sim = match config.seed {
            Some(seed) => Self::with_seed(seed),
            None => Self::new(),
        };

        let lb_config = LoadBalancerConfig {
            rps: config.rps,
            rps_variance: config.rps_variance,
            request_cost: config.request_cost,
            request_size: config.request_size,
            travel_ms: config.travel_ms,
        };
        let lbs = (0..config.load_balancers)
            .map(|i| {
                sim.add_load_balancer(
                    &format!("Load Balancer {}", i + 1),
                    lb_config.clone(),
                    config.algorithm,
                )
            })
            .collect::<Result<Vec<AgentId>>>()?;

        for i in 0..config.num_servers {
            let power = config.server_power.bounds_for(i).ok_or_else(|| {
                SimError::invalid_config(format!("no power configured for server {}", i + 1))
            })?;
            let name = format!("Server {}", i + 1);
            let server = sim.add_server(&name, power, config.queue_max_length)?;
            for &lb in &lbs {
                sim.attach_server(lb, server)?;
            }
        }

        log::info!(
            "simulation built: {} load balancer(s), {} server(s), algorithm {}",
            config.load_balancers,
            config.num_servers,
            config.algorithm
        );
        Ok(sim)
    }

    pub fn time_ms(&self) -> f64 {
        self.time_ms
    }

    pub fn next_id(&mut self) -> AgentId {
        self.ids.next_id()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn add_server(
        &mut self,
        name: &str,
        power: Bounds,
        queue_capacity: usize,
    ) -> Result<AgentId> {
        power.check_argument("server power")?;
        let id = self.ids.next_id();
        let server = Server::new(id, name, power, queue_capacity, &mut self.rng);
        self.servers.insert(id, server);
        self.live.push((id, AgentKind::Server));
        Ok(id)
    }

    pub fn add_load_balancer(
        &mut self,
        name: &str,
        config: LoadBalancerConfig,
        strategy: BalancingStrategy,
    ) -> Result<AgentId> {
        check_rps(config.rps)?;
        check_rps_variance(config.rps_variance)?;
        config.request_cost.check_argument("request cost")?;
        if !config.travel_ms.is_finite() || config.travel_ms < 0.0 {
            return Err(SimError::invalid_argument(format!(
                "travel time must be non-negative, got {}",
                config.travel_ms
            )));
        }
        let id = self.ids.next_id();
        let in_flight = self.connection_counts();
        let lb = LoadBalancer::new(id, name, config, strategy, &in_flight);
        self.load_balancers.insert(id, lb);
        self.live.push((id, AgentKind::LoadBalancer));
        Ok(id)
    }

    pub fn attach_server(&mut self, lb: AgentId, server: AgentId) -> Result<()> {
        if !self.is_server_live(server) {
            return Err(SimError::UnknownAgent { id: server });
        }
        self.load_balancer_mut(lb)?.add_server(server);
        Ok(())
    }

    pub(crate) fn insert_request(&mut self, request: Request) {
        let id = request.id();
        self.requests.insert(id, request);
        self.live.push((id, AgentKind::Request));
    }

    /// Hands a request to its destination server, or destroys it as an
    /// abandoned delivery when that server is gone.
    pub(crate) fn deliver(&mut self, request: &mut Request) {
        let now = self.time_ms;
        request.mark_arrived();
        let Some(destination) = request.destination() else {
            return;
        };
        match self
            .servers
            .get_mut(&destination)
            .filter(|server| !server.is_destroyed())
        {
            Some(server) => server.add_request(request, now),
            None => {
                log::debug!(
                    "request {} abandoned, server {} is gone",
                    request.id(),
                    destination
                );
                request.destroy();
            }
        }
    }

    pub fn is_server_live(&self, id: AgentId) -> bool {
        self.servers.get(&id).is_some_and(|server| !server.is_destroyed())
    }

    pub fn server(&self, id: AgentId) -> Option<&Server> {
        self.servers.get(&id)
    }

    pub fn request(&self, id: AgentId) -> Option<&Request> {
        self.requests.get(&id)
    }

    pub(crate) fn request_mut(&mut self, id: AgentId) -> Option<&mut Request> {
        self.requests.get_mut(&id)
    }

    pub fn server_mut(&mut self, id: AgentId) -> Result<&mut Server> {
        self.servers
            .get_mut(&id)
            .ok_or(SimError::UnknownAgent { id })
    }

    pub fn load_balancer(&self, id: AgentId) -> Option<&LoadBalancer> {
        self.load_balancers.get(&id)
    }

    pub fn load_balancer_mut(&mut self, id: AgentId) -> Result<&mut LoadBalancer> {
        self.load_balancers
            .get_mut(&id)
            .ok_or(SimError::UnknownAgent { id })
    }

    /// Live agent ids in update order.
    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.live.iter().map(|&(id, _)| id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn ids_of(&self, kind: AgentKind) -> Vec<AgentId> {
        self.live
            .iter()
            .filter(|&&(_, k)| k == kind)
            .map(|&(id, _)| id)
            .collect()
    }

    pub fn server_ids(&self) -> Vec<AgentId> {
        self.ids_of(AgentKind::Server)
            .into_iter()
            .filter(|&id| self.is_server_live(id))
            .collect()
    }

    pub fn load_balancer_ids(&self) -> Vec<AgentId> {
        self.ids_of(AgentKind::LoadBalancer)
    }

    /// Requests not yet destroyed, in no particular order.
    pub fn requests(&self) -> impl Iterator<Item = &Request> + '_ {
        self.requests.values().filter(|r| !r.is_destroyed())
    }

    /// Open requests per destination server, across every load balancer.
    pub fn connection_counts(&self) -> ConnectionCounts {
        let mut counts = ConnectionCounts::new();
        for destination in self.requests().filter_map(Request::destination) {
            *counts.entry(destination).or_insert(0) += 1;
        }
        counts
    }

    pub fn tick(&mut self, delta_ms: f64) {
        let delta_ms = if delta_ms.is_finite() && delta_ms >= 0.0 {
            delta_ms
        } else {
            log::warn!("[simulator] rejecting tick delta {delta_ms}, using 0");
            0.0
        };
        self.time_ms += delta_ms;
        self.prune();

        log::trace!("[simulator] update({delta_ms})");
        let mut idx = 0;
        while idx < self.live.len() {
            let (id, kind) = self.live[idx];
            idx += 1;
            match kind {
                AgentKind::Request => self.update_detached(id, delta_ms, requests_of),
                AgentKind::Server => self.update_detached(id, delta_ms, servers_of),
                AgentKind::LoadBalancer => self.update_detached(id, delta_ms, load_balancers_of),
            }
        }
    }

    /// Ticks in steps of at most `step_ms` until `duration_ms` has elapsed.
    pub fn run_for(&mut self, duration_ms: f64, step_ms: f64) -> Result<()> {
        if !(step_ms > 0.0 && step_ms.is_finite()) {
            return Err(SimError::invalid_argument(format!(
                "tick step must be positive, got {step_ms}"
            )));
        }
        let mut remaining = duration_ms;
        while remaining > 0.0 {
            let step = step_ms.min(remaining);
            self.tick(step);
            remaining -= step;
        }
        Ok(())
    }

    fn prune(&mut self) {
        let Self {
            live,
            requests,
            servers,
            load_balancers,
            ..
        } = self;
        let before = live.len();
        live.retain(|&(id, kind)| {
            let destroyed = match kind {
                AgentKind::Request => requests.get(&id).map_or(true, |r| r.is_destroyed()),
                AgentKind::Server => servers.get(&id).map_or(true, |s| s.is_destroyed()),
                AgentKind::LoadBalancer => {
                    load_balancers.get(&id).map_or(true, |lb| lb.is_destroyed())
                }
            };
            if destroyed {
                match kind {
                    AgentKind::Request => {
                        requests.remove(&id);
                    }
                    AgentKind::Server => {
                        servers.remove(&id);
                    }
                    AgentKind::LoadBalancer => {
                        load_balancers.remove(&id);
                    }
                }
            }
            !destroyed
        });

        let removed = before - live.len();
        if removed > 0 {
            for lb in load_balancers.values_mut() {
                lb.retain_servers(|id| servers.contains_key(&id));
            }
        }
        log::trace!("[simulator] removed {removed} agents");
    }

    /// Takes an agent out of its store so it can borrow the rest of the
    /// simulation mutably, then puts it back.
    fn with_detached<A, R>(
        &mut self,
        id: AgentId,
        store: fn(&mut Simulation) -> &mut Store<A>,
        f: impl FnOnce(&mut A, &mut Simulation) -> R,
    ) -> Option<R> {
        let mut agent = store(self).remove(&id)?;
        let result = f(&mut agent, self);
        store(self).insert(id, agent);
        Some(result)
    }

    fn update_detached<A: Agent>(
        &mut self,
        id: AgentId,
        delta_ms: f64,
        store: fn(&mut Simulation) -> &mut Store<A>,
    ) {
        self.with_detached(id, store, |agent, sim| agent.update(delta_ms, sim));
    }

    /// Makes a load balancer emit one request now, outside its own schedule.
    pub fn send_request(&mut self, lb: AgentId) -> Result<Option<AgentId>> {
        self.with_detached(lb, load_balancers_of, |balancer, sim| balancer.send_request(sim))
            .ok_or(SimError::UnknownAgent { id: lb })
    }

    /// Swaps the routing strategy of `lb`; the new strategy recovers its
    /// connection counts from the requests currently in flight.
    pub fn set_strategy(&mut self, lb: AgentId, strategy: BalancingStrategy) -> Result<()> {
        self.install_strategy(lb, strategy.build())?;
        log::info!("[{lb}] routing with {strategy}");
        Ok(())
    }

    /// Like [`Simulation::set_strategy`], for strategies defined outside this crate.
    pub fn install_strategy(
        &mut self,
        lb: AgentId,
        strategy: Box<dyn RoutingStrategy>,
    ) -> Result<()> {
        let in_flight = self.connection_counts();
        self.load_balancer_mut(lb)?.set_strategy(strategy, &in_flight);
        Ok(())
    }

    pub fn set_strategy_by_name(&mut self, lb: AgentId, name: &str) -> Result<()> {
        self.set_strategy(lb, name.parse()?)
    }

    pub fn on_request_destroyed(
        &mut self,
        lb: AgentId,
        observer: impl FnMut(&Request) + 'static,
    ) -> Result<()> {
        self.load_balancer_mut(lb)?.on_request_destroyed(observer);
        Ok(())
    }

    pub fn set_rps(&mut self, lb: AgentId, rps: f64) -> Result<()> {
        check_rps(rps)?;
        self.load_balancer_mut(lb)?.config.rps = rps;
        Ok(())
    }

    pub fn set_rps_variance(&mut self, lb: AgentId, variance: f64) -> Result<()> {
        check_rps_variance(variance)?;
        self.load_balancer_mut(lb)?.config.rps_variance = variance;
        Ok(())
    }

    pub fn set_request_cost(&mut self, lb: AgentId, cost: Bounds) -> Result<()> {
        cost.check_argument("request cost")?;
        self.load_balancer_mut(lb)?.config.request_cost = cost;
        Ok(())
    }

    /// Re-draws every server's power from `range`, returning the drawn values
    /// in server order.
    pub fn set_server_power(&mut self, range: Bounds) -> Result<Vec<f64>> {
        range.check_argument("server power")?;
        let ids = self.server_ids();
        let mut drawn = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(server) = self.servers.get_mut(&id) {
                drawn.push(server.set_power_range(range, &mut self.rng));
            }
        }
        Ok(drawn)
    }

    /// Grows the server pool by cloning the first server's settings, or
    /// shrinks it by destroying the most recently added servers.
    pub fn set_num_servers(&mut self, count: usize) -> Result<()> {
        let servers = self.server_ids();
        if count > servers.len() {
            let (power, capacity) = servers
                .first()
                .and_then(|id| self.servers.get(id))
                .map(|s| (s.power_range(), s.queue().capacity()))
                .ok_or_else(|| SimError::invalid_argument("cannot grow an empty server pool"))?;
            let lbs = self.load_balancer_ids();
            for i in servers.len()..count {
                let id = self.add_server(&format!("Server {}", i + 1), power, capacity)?;
                for &lb in &lbs {
                    self.attach_server(lb, id)?;
                }
            }
        } else {
            for &id in servers[count..].iter().rev() {
                self.destroy(id)?;
                for lb in self.load_balancers.values_mut() {
                    lb.remove_server(id);
                }
            }
        }
        Ok(())
    }

    /// Destroys any live agent. A destroyed request gives its queue slot or
    /// service slot back at once. Destroying a server also destroys the
    /// requests waiting in its queue; the one in service notices on its next
    /// update.
    pub fn destroy(&mut self, id: AgentId) -> Result<()> {
        if let Some(request) = self.requests.get_mut(&id) {
            if let Some(server) = request
                .destination()
                .and_then(|server| self.servers.get_mut(&server))
            {
                server.release(id);
            }
            request.destroy();
            return Ok(());
        }
        if let Some(server) = self.servers.get_mut(&id) {
            server.destroy();
            for queued in server.drain_queue() {
                if let Some(request) = self.requests.get_mut(&queued) {
                    request.destroy();
                }
            }
            return Ok(());
        }
        if let Some(lb) = self.load_balancers.get_mut(&id) {
            lb.destroy();
            return Ok(());
        }
        Err(SimError::UnknownAgent { id })
    }
}
