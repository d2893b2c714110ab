//! Named-event dispatch.
//!
//! Every stateful entity (the [`Session`](crate::Session) and each
//! [`Subscription`](crate::Subscription)) owns an [`EventBus`]. Callers only ever see
//! the [`Listen`] side; emitting stays inside the crate.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Boxed event handler.
pub type Handler<T> = Box<dyn FnMut(&T) + Send>;

/// Identifies a registered handler so it can be removed with [`Listen::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Registration side of an event source.
pub trait Listen<T> {
    /// Register `handler` for every future `event`.
    fn on<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&T) + Send + 'static;

    /// Register `handler` for the next `event` only.
    fn once<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&T) + Send + 'static;

    /// Remove a handler. Returns `false` if it was not registered for `event`.
    fn off(&mut self, event: &str, id: HandlerId) -> bool;
}

/// Emitting side of an event source.
pub trait Emit<T> {
    /// Invoke the handlers of `event` in registration order. Returns how many ran.
    fn emit(&mut self, event: &str, payload: &T) -> usize;
}

struct Registration<T> {
    id: HandlerId,
    once: bool,
    handler: Handler<T>,
}

/// Publish/subscribe dispatcher for named events.
///
/// A panicking handler is caught and logged at debug level; the remaining handlers
/// for the event still run.
pub struct EventBus<T> {
    handlers: HashMap<String, Vec<Registration<T>>>,
    next_id: u64,
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }
}

impl<T> EventBus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, event: String, once: bool, handler: Handler<T>) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers.entry(event).or_default().push(Registration {
            id,
            once,
            handler,
        });
        id
    }

    /// Number of handlers currently registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Drop every handler for `event`, or all handlers when `event` is `None`.
    pub fn remove_all(&mut self, event: Option<&str>) {
        match event {
            Some(event) => {
                self.handlers.remove(event);
            }
            None => self.handlers.clear(),
        }
    }
}

impl<T> Listen<T> for EventBus<T> {
    fn on<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&T) + Send + 'static,
    {
        self.register(event.into(), false, Box::new(handler))
    }

    fn once<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&T) + Send + 'static,
    {
        self.register(event.into(), true, Box::new(handler))
    }

    fn off(&mut self, event: &str, id: HandlerId) -> bool {
        let Some(registrations) = self.handlers.get_mut(event) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }
}

impl<T> Emit<T> for EventBus<T> {
    fn emit(&mut self, event: &str, payload: &T) -> usize {
        let Some(registrations) = self.handlers.get_mut(event) else {
            return 0;
        };

        for registration in registrations.iter_mut() {
            let handler = &mut registration.handler;
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                #[cfg(feature = "tracing")]
                tracing::debug!(event, %reason, "Event handler panicked");
                #[cfg(not(feature = "tracing"))]
                let _ = &reason;
            }
        }

        let invoked = registrations.len();
        registrations.retain(|r| !r.once);
        if registrations.is_empty() {
            self.handlers.remove(event);
        }
        invoked
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let (log, seen) = recorder();
        let mut bus = EventBus::<u32>::new();

        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            bus.on("tick", move |n: &u32| log.lock().unwrap().push(format!("{name}{n}")));
        }

        assert_eq!(bus.emit("tick", &1), 3);
        assert_eq!(*seen.lock().unwrap(), ["a1", "b1", "c1"]);
    }

    #[test]
    fn once_handler_is_removed_after_first_call() {
        let (log, seen) = recorder();
        let mut bus = EventBus::<u32>::new();

        bus.once("tick", move |n: &u32| log.lock().unwrap().push(n.to_string()));

        assert_eq!(bus.emit("tick", &1), 1);
        assert_eq!(bus.emit("tick", &2), 0);
        assert_eq!(*seen.lock().unwrap(), ["1"]);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[test]
    fn off_removes_only_that_handler() {
        let (log, seen) = recorder();
        let mut bus = EventBus::<u32>::new();

        let first = {
            let log = Arc::clone(&log);
            bus.on("tick", move |_: &u32| log.lock().unwrap().push("first".to_owned()))
        };
        bus.on("tick", move |_: &u32| log.lock().unwrap().push("second".to_owned()));

        assert!(bus.off("tick", first));
        assert!(!bus.off("tick", first));
        assert!(!bus.off("other", first));

        bus.emit("tick", &0);
        assert_eq!(*seen.lock().unwrap(), ["second"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_dispatch() {
        let (log, seen) = recorder();
        let mut bus = EventBus::<u32>::new();

        bus.on("tick", |_: &u32| panic!("bad listener"));
        bus.on("tick", move |_: &u32| log.lock().unwrap().push("ok".to_owned()));

        assert_eq!(bus.emit("tick", &0), 2);
        assert_eq!(*seen.lock().unwrap(), ["ok"]);
        assert_eq!(bus.listener_count("tick"), 2);
    }

    #[test]
    fn events_are_independent() {
        let (log, seen) = recorder();
        let mut bus = EventBus::<u32>::new();

        bus.on("a", move |_: &u32| log.lock().unwrap().push("a".to_owned()));

        assert_eq!(bus.emit("b", &0), 0);
        assert!(seen.lock().unwrap().is_empty());

        bus.remove_all(None);
        assert_eq!(bus.listener_count("a"), 0);
    }
}
