use rand::RngCore;

use crate::components::queue::RequestQueue;
use crate::components::request::Request;
use crate::config::Bounds;
use crate::engine::Simulation;
use crate::lifecycle::{self, Lifecycle};
use crate::traits::{Agent, AgentId, AgentKind};

pub struct Server {
    lifecycle: Lifecycle<Server>,
    pub name: String,
    power_range: Bounds,
    power: f64,
    current: Option<AgentId>,
    queue: RequestQueue,
    pub served: u64,
    pub dropped: u64,
}

impl Server {
    pub fn new(
        id: AgentId,
        name: &str,
        power_range: Bounds,
        queue_capacity: usize,
        rng: &mut dyn RngCore,
    ) -> Self {
        let mut server = Self {
            lifecycle: Lifecycle::new(id),
            name: name.to_string(),
            power_range,
            power: power_range.min,
            current: None,
            queue: RequestQueue::new(queue_capacity),
            served: 0,
            dropped: 0,
        };
        server.set_power_range(power_range, rng);
        server
    }

    /// Stores a new power range and draws the concrete power from it.
    /// Routing strategies weigh servers by the drawn value.
    pub fn set_power_range(&mut self, range: Bounds, rng: &mut dyn RngCore) -> f64 {
        self.power_range = range;
        self.power = range.sample(rng);
        log::debug!("[{}] power drawn {:.3} from {:?}", self.id(), self.power, range);
        self.power
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn power_range(&self) -> Bounds {
        self.power_range
    }

    pub fn current_request(&self) -> Option<AgentId> {
        self.current
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Requests in service plus those waiting.
    pub fn active_requests(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    pub fn on_destroy(&mut self, hook: impl FnMut(&Server) + 'static) {
        self.lifecycle.on_destroy(hook);
    }

    /// Takes `request` into service if idle, otherwise queues it. A full queue
    /// drops the request: it is flagged and destroyed on the spot so its
    /// destroy hooks still report back to the load balancer.
    pub fn add_request(&mut self, request: &mut Request, now_ms: f64) {
        if self.current.is_none() {
            self.begin_service(request, now_ms);
            return;
        }
        if !self.queue.enqueue(request, now_ms) {
            log::debug!(
                "[{}] queue full ({}), dropping request {}",
                self.id(),
                self.queue.capacity(),
                request.id()
            );
            self.dropped += 1;
            request.dropped = true;
            request.destroy();
        }
    }

    fn begin_service(&mut self, request: &mut Request, now_ms: f64) {
        request.work_started = Some(now_ms);
        self.current = Some(request.id());
    }

    /// Forgets `request`, whether in service or queued.
    pub(crate) fn release(&mut self, request: AgentId) {
        if self.current == Some(request) {
            self.current = None;
        } else {
            self.queue.remove(request);
        }
    }

    pub(crate) fn drain_queue(&mut self) -> Vec<AgentId> {
        self.queue.drain()
    }
}

impl Agent for Server {
    fn id(&self) -> AgentId {
        self.lifecycle.id()
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Server
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

    /// Burns `power * delta_ms` of cost off the request in service. Capacity
    /// left over when a request finishes carries into the next queued request
    /// within the same tick.
    fn update(&mut self, delta_ms: f64, sim: &mut Simulation) {
        if self.is_destroyed() {
            return;
        }
        let now = sim.time_ms();
        let mut power = self.power;

        loop {
            let id = match self.current {
                Some(id) => id,
                None => match self.queue.dequeue() {
                    Some(id) => id,
                    None => break,
                },
            };
            let Some(request) = sim.request_mut(id).filter(|r| !r.is_destroyed()) else {
                self.current = None;
                continue;
            };
            if self.current.is_none() {
                self.begin_service(request, now);
            }

            request.cost -= power * delta_ms;
            request.time_spent_processing_ms += delta_ms;
            if request.cost > 0.0 {
                break;
            }

            power = -request.cost;
            request.served = Some(now);
            self.current = None;
            self.served += 1;
            request.destroy();
        }
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("power", &self.power)
            .field("current", &self.current)
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
