use serde::{Deserialize, Serialize};

use crate::engine::Simulation;

pub type AgentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    Request,
    Server,
    LoadBalancer,
}

/// A live participant of the simulation.
///
/// The engine removes destroyed agents at the start of every tick and calls
/// `update` on the rest in insertion order. While `update` runs the agent is
/// detached from the simulation's stores, so it may freely borrow the others.
pub trait Agent {
    fn id(&self) -> AgentId;
    fn kind(&self) -> AgentKind;
    fn is_destroyed(&self) -> bool;

    /// Flags the agent destroyed and fires its destroy hooks at the call site.
    /// Repeated calls are no-ops.
    fn destroy(&mut self);

    fn update(&mut self, delta_ms: f64, sim: &mut Simulation);
}
