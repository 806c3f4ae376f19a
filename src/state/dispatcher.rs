//! State dispatcher for pub-sub pattern

use crate::state::events::StateEvent;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// Trait for components that derive their own state from other slots
pub trait StateSubscriber {
    /// Handle a state event
    fn on_state_event(&self, event: &StateEvent);

    /// Get subscriber name for debugging
    fn name(&self) -> &str;
}

/// Delivers state events to subscribers in subscription order.
///
/// Subscribers are held weakly so the dispatcher never keeps a component
/// alive; dead entries are pruned on the next dispatch. Delivery is
/// synchronous, and a subscriber may dispatch further events from its handler.
pub struct StateDispatcher {
    subscribers: RefCell<Vec<Weak<dyn StateSubscriber>>>,

    /// Event kinds for debugging
    event_history: RefCell<VecDeque<&'static str>>,

    max_history: usize,
}

impl StateDispatcher {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            event_history: RefCell::new(VecDeque::new()),
            max_history: 100,
        }
    }

    pub fn subscribe<S: StateSubscriber + 'static>(&self, subscriber: &Rc<S>) {
        info!("StateDispatcher: Adding subscriber: {}", subscriber.name());
        let subscriber: Rc<dyn StateSubscriber> = subscriber.clone();
        self.subscribers.borrow_mut().push(Rc::downgrade(&subscriber));
    }

    pub fn dispatch(&self, event: StateEvent) {
        debug!(target: "state", "Dispatching event: {}", event.kind());

        {
            let mut history = self.event_history.borrow_mut();
            history.push_back(event.kind());
            if history.len() > self.max_history {
                history.pop_front();
            }
        }

        // Collect first so handlers can subscribe or dispatch re-entrantly
        let subscribers: Vec<Rc<dyn StateSubscriber>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|s| s.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for subscriber in subscribers {
            debug!(target: "state", "Notifying subscriber: {}", subscriber.name());
            subscriber.on_state_event(&event);
        }
    }

    /// Get event history for debugging
    pub fn event_history(&self) -> Vec<&'static str> {
        self.event_history.borrow().iter().copied().collect()
    }
}

impl Default for StateDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
