//! Location provider abstraction.
//!
//! The follower consumes fixes through [`FixListener`]; where they come
//! from is the host's business. [`SimulatedLocationSource`] feeds recorded
//! or synthetic fixes for tests and replay tooling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::Fix;

/// Handle returned by [`LocationSource::subscribe`].
pub type ListenerId = u64;

/// Provider backing a location source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gps,
    Network,
    Simulated,
}

/// Filter applied before a fix is delivered to a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixCriteria {
    /// Reject fixes with a worse (larger) reported accuracy, meters.
    pub max_accuracy_m: Option<f64>,
}

impl FixCriteria {
    pub fn accepts(&self, fix: &Fix) -> bool {
        match self.max_accuracy_m {
            Some(max) => fix.accuracy_m <= max,
            None => true,
        }
    }
}

/// Receives fixes from a [`LocationSource`]. Implementations must be cheap:
/// delivery happens on the source's thread.
pub trait FixListener: Send + Sync {
    fn on_fix(&self, fix: &Fix);
}

/// A source of position fixes.
pub trait LocationSource: Send + Sync {
    fn provider(&self) -> ProviderKind;

    fn subscribe(&self, listener: Arc<dyn FixListener>, criteria: FixCriteria) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId);
}

type Subscriber = (ListenerId, Arc<dyn FixListener>, FixCriteria);

/// In-process source fed by [`push_fix`](SimulatedLocationSource::push_fix).
#[derive(Default)]
pub struct SimulatedLocationSource {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl SimulatedLocationSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one fix to every subscriber whose criteria accept it.
    pub fn push_fix(&self, fix: &Fix) {
        let subscribers = match self.subscribers.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, listener, criteria) in subscribers.iter() {
            if criteria.accepts(fix) {
                listener.on_fix(fix);
            }
        }
    }

    /// Deliver a whole recorded trace in order.
    pub fn replay(&self, fixes: &[Fix]) {
        for fix in fixes {
            self.push_fix(fix);
        }
    }
}

impl LocationSource for SimulatedLocationSource {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    fn subscribe(&self, listener: Arc<dyn FixListener>, criteria: FixCriteria) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = match self.subscribers.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.push((id, listener, criteria));
        id
    }

    fn unsubscribe(&self, id: ListenerId) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|(sid, _, _)| *sid != id);
    }
}
