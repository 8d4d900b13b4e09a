use crate::traits::AgentId;

pub type DestroyHook<T> = Box<dyn FnMut(&T)>;

/// Identity, destroyed flag and destroy hooks shared by every agent type.
pub struct Lifecycle<T> {
    id: AgentId,
    destroyed: bool,
    hooks: Vec<DestroyHook<T>>,
}

impl<T> Lifecycle<T> {
    pub fn new(id: AgentId) -> Self {
        Self {
            id,
            destroyed: false,
            hooks: Vec::new(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn on_destroy(&mut self, hook: impl FnMut(&T) + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Flags the owner destroyed and hands its hooks back to be run against it.
    /// Returns `None` if the owner was already destroyed.
    pub fn begin_destroy(&mut self) -> Option<Vec<DestroyHook<T>>> {
        if self.destroyed {
            return None;
        }
        self.destroyed = true;
        Some(std::mem::take(&mut self.hooks))
    }
}

impl<T> std::fmt::Debug for Lifecycle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("id", &self.id)
            .field("destroyed", &self.destroyed)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// Hands out agent ids for one simulation instance.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next: AgentId,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> AgentId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Runs hooks returned by [`Lifecycle::begin_destroy`].
pub(crate) fn fire<T>(hooks: Vec<DestroyHook<T>>, subject: &T) {
    for mut hook in hooks {
        hook(subject);
    }
}
