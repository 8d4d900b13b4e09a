use std::collections::VecDeque;

use crate::components::request::Request;
use crate::traits::{Agent, AgentId};

/// Bounded FIFO of requests waiting for one server.
#[derive(Debug, Clone)]
pub struct RequestQueue {
    capacity: usize,
    requests: VecDeque<AgentId>,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            requests: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends `request` and stamps its queued time, or returns `false`
    /// without touching the queue when it is full.
    pub fn enqueue(&mut self, request: &mut Request, now_ms: f64) -> bool {
        if self.requests.len() >= self.capacity {
            return false;
        }
        request.queued = Some(now_ms);
        self.requests.push_back(request.id());
        true
    }

    pub fn dequeue(&mut self) -> Option<AgentId> {
        self.requests.pop_front()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.requests.iter().copied()
    }

    /// Takes `request` out wherever it waits. Returns whether it was queued.
    pub fn remove(&mut self, request: AgentId) -> bool {
        match self.requests.iter().position(|&id| id == request) {
            Some(at) => {
                self.requests.remove(at);
                true
            }
            None => false,
        }
    }

    pub(crate) fn drain(&mut self) -> Vec<AgentId> {
        self.requests.drain(..).collect()
    }
}
