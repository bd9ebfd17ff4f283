//! Per-element set of requests that have been dispatched and not yet settled.

use std::{cell::RefCell, rc::Rc};

use futures::future::{AbortHandle, AbortRegistration};

#[derive(Default)]
struct Slots {
    next_id: u64,
    entries: Vec<(u64, AbortHandle)>,
}

/// Shared handle to one element's in-flight requests.
#[derive(Clone, Default)]
pub struct InFlight {
    slots: Rc<RefCell<Slots>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Track a new request. The entry is removed when the guard drops,
    /// whatever the outcome of the request.
    pub fn register(&self) -> (InFlightGuard, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        let mut slots = self.slots.borrow_mut();
        let id = slots.next_id;
        slots.next_id += 1;
        slots.entries.push((id, handle));

        let guard = InFlightGuard {
            set: self.clone(),
            id,
        };
        (guard, registration)
    }

    /// Abort every tracked request, returning how many were signalled.
    pub fn abort_all(&self) -> usize {
        let slots = self.slots.borrow();
        for (_, handle) in &slots.entries {
            handle.abort();
        }
        slots.entries.len()
    }
}

pub struct InFlightGuard {
    set: InFlight,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut slots = self.set.slots.borrow_mut();
        slots.entries.retain(|(id, _)| *id != self.id);
    }
}
