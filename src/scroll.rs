//! Infinite-scroll trigger.
//!
//! Models a viewport observer watching the last rendered row. The host
//! reports visibility changes through [`ScrollTrigger::notify`]; the
//! threshold callback runs once per transition into view, and only when more
//! pages exist and no next-page fetch is already running.

use std::fmt;
use tracing::debug;

/// Query facts sampled at the moment visibility changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerGate {
    pub has_next_page: bool,
    pub is_fetching_next: bool,
}

impl TriggerGate {
    fn open(&self) -> bool {
        self.has_next_page && !self.is_fetching_next
    }
}

struct Observation<N> {
    node: N,
    intersecting: bool,
    on_threshold: Box<dyn FnMut() + Send>,
}

/// Holds at most one observation. Attaching a new node releases the previous
/// one first; dropping the trigger releases whatever is observed.
pub struct ScrollTrigger<N> {
    active: Option<Observation<N>>,
}

impl<N> Default for ScrollTrigger<N> {
    fn default() -> Self {
        Self { active: None }
    }
}

impl<N: fmt::Debug> fmt::Debug for ScrollTrigger<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollTrigger")
            .field("observed", &self.active.as_ref().map(|obs| &obs.node))
            .finish()
    }
}

impl<N: PartialEq + fmt::Debug> ScrollTrigger<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing `node`. Any previous observation is detached first.
    pub fn attach<F>(&mut self, node: N, on_threshold: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.detach();
        debug!(?node, "scroll trigger attached");
        self.active = Some(Observation {
            node,
            intersecting: false,
            on_threshold: Box::new(on_threshold),
        });
    }

    /// Stop observing and release the node.
    pub fn detach(&mut self) {
        if let Some(obs) = self.active.take() {
            debug!(node = ?obs.node, "scroll trigger detached");
        }
    }

    pub fn observed(&self) -> Option<&N> {
        self.active.as_ref().map(|obs| &obs.node)
    }

    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    /// Report a visibility change for `node`. Returns true if the threshold
    /// callback ran. Reports for nodes other than the observed one are
    /// ignored.
    pub fn notify(&mut self, node: &N, intersecting: bool, gate: TriggerGate) -> bool {
        let Some(obs) = self.active.as_mut() else {
            return false;
        };
        if obs.node != *node {
            return false;
        }
        let entered = intersecting && !obs.intersecting;
        obs.intersecting = intersecting;
        if !entered {
            return false;
        }
        if !gate.open() {
            debug!(?node, ?gate, "threshold reached but gate closed");
            return false;
        }
        (obs.on_threshold)();
        true
    }
}
