use serde::{Deserialize, Serialize};

use crate::engine::Simulation;
use crate::error::{Result, SimError};
use crate::lifecycle::{self, Lifecycle};
use crate::traits::{Agent, AgentId, AgentKind};

/// A unit of work travelling from a load balancer to one server.
pub struct Request {
    lifecycle: Lifecycle<Request>,
    pub size: f64,
    /// Remaining work. Only decreases while in service.
    pub cost: f64,
    pub initial_cost: f64,
    pub source: Option<AgentId>,
    destination: Option<AgentId>,
    pub created: f64,
    pub queued: Option<f64>,
    pub work_started: Option<f64>,
    pub served: Option<f64>,
    pub age: f64,
    pub time_spent_processing_ms: f64,
    pub dropped: bool,
    transit_remaining_ms: f64,
    arrived: bool,
}

/// Snapshot of a request handed to telemetry consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: AgentId,
    pub cost: f64,
    pub initial_cost: f64,
    pub created_ms: f64,
    pub queued_ms: Option<f64>,
    pub work_started_ms: Option<f64>,
    pub served_ms: Option<f64>,
    pub age_ms: f64,
    pub time_spent_processing_ms: f64,
    pub dropped: bool,
    pub destination: Option<AgentId>,
}

impl Request {
    pub fn new(id: AgentId, cost: f64, created: f64) -> Self {
        Self {
            lifecycle: Lifecycle::new(id),
            size: 10.0,
            cost,
            initial_cost: cost,
            source: None,
            destination: None,
            created,
            queued: None,
            work_started: None,
            served: None,
            age: 0.0,
            time_spent_processing_ms: 0.0,
            dropped: false,
            transit_remaining_ms: 0.0,
            arrived: false,
        }
    }

    pub fn with_source(mut self, source: AgentId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn destination(&self) -> Option<AgentId> {
        self.destination
    }

    /// Routes the request to `server`, arriving after `travel_ms`. A request is
    /// routed at most once.
    pub fn set_destination(&mut self, server: AgentId, travel_ms: f64) -> Result<()> {
        if self.destination.is_some() {
            return Err(SimError::DestinationAlreadySet { request: self.id() });
        }
        self.destination = Some(server);
        self.transit_remaining_ms = travel_ms.max(0.0);
        Ok(())
    }

    pub fn in_transit(&self) -> bool {
        self.destination.is_some() && !self.arrived
    }

    pub(crate) fn mark_arrived(&mut self) {
        self.arrived = true;
    }

    pub fn on_destroy(&mut self, hook: impl FnMut(&Request) + 'static) {
        self.lifecycle.on_destroy(hook);
    }

    /// Fraction of the initial cost still outstanding.
    pub fn progress_remaining(&self) -> f64 {
        if self.initial_cost <= 0.0 {
            return 0.0;
        }
        (self.cost / self.initial_cost).max(0.0)
    }

    pub fn record(&self) -> RequestRecord {
        RequestRecord {
            id: self.id(),
            cost: self.cost,
            initial_cost: self.initial_cost,
            created_ms: self.created,
            queued_ms: self.queued,
            work_started_ms: self.work_started,
            served_ms: self.served,
            age_ms: self.age,
            time_spent_processing_ms: self.time_spent_processing_ms,
            dropped: self.dropped,
            destination: self.destination,
        }
    }
}

impl Agent for Request {
    fn id(&self) -> AgentId {
        self.lifecycle.id()
    }

    fn kind(&self) -> AgentKind {
        AgentKind::Request
    }

    fn is_destroyed(&self) -> bool {
        self.lifecycle.is_destroyed()
    }

    fn destroy(&mut self) {
        if let Some(hooks) = self.lifecycle.begin_destroy() {
            log::trace!("[{}] destroy(dropped={})", self.id(), self.dropped);
            lifecycle::fire(hooks, self);
        }
    }

    fn update(&mut self, delta_ms: f64, sim: &mut Simulation) {
        if self.is_destroyed() {
            return;
        }
        self.age += delta_ms;

        let Some(destination) = self.destination else {
            return;
        };
        if !sim.is_server_live(destination) {
            log::debug!(
                "[{}] destination {} is gone, abandoning delivery",
                self.id(),
                destination
            );
            self.destroy();
            return;
        }

        if self.arrived {
            return;
        }
        self.transit_remaining_ms -= delta_ms;
        if self.transit_remaining_ms <= 0.0 {
            sim.deliver(self);
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id())
            .field("cost", &self.cost)
            .field("destination", &self.destination)
            .field("dropped", &self.dropped)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
