use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Keyed debounced tasks on the current `LocalSet`.
///
/// `schedule` replaces any invocation still waiting under the same key, so a
/// burst of calls collapses into the last one. Once the delay has elapsed the
/// invocation is no longer pending and can't be cancelled any more: whatever
/// it started (typically a request) runs to completion, and the caller is
/// expected to drop its outcome if it has been superseded.
///
/// Must be used from inside a `tokio::task::LocalSet`.
#[derive(Clone, Default)]
pub struct DebouncedTasks {
    pending: Rc<RefCell<HashMap<&'static str, (u64, JoinHandle<()>)>>>,
    generation: Rc<Cell<u64>>,
}

impl DebouncedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` after `delay` unless another call with the same key comes first
    pub fn schedule<F, Fut>(&self, key: &'static str, delay: Duration, f: F)
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.cancel(key);

        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        let pending = Rc::clone(&self.pending);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = pending.borrow_mut();
                if matches!(pending.get(key), Some((g, _)) if *g == generation) {
                    pending.remove(key);
                }
            }
            trace!(target: "debounce", "firing '{}'", key);
            f().await;
        });

        self.pending.borrow_mut().insert(key, (generation, handle));
    }

    /// Cancel the invocation waiting under `key`.
    /// Returns true if one was still pending.
    pub fn cancel(&self, key: &'static str) -> bool {
        match self.pending.borrow_mut().remove(key) {
            Some((_, handle)) => {
                handle.abort();
                trace!(target: "debounce", "cancelled '{}'", key);
                true
            }
            None => false,
        }
    }

    /// Check if an invocation is waiting under `key`
    pub fn is_pending(&self, key: &'static str) -> bool {
        self.pending.borrow().contains_key(key)
    }

    pub fn cancel_all(&self) {
        for (_, (_, handle)) in self.pending.borrow_mut().drain() {
            handle.abort();
        }
    }
}
