#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;

use crate::event::{Emit, EventBus, HandlerId, Listen};
use crate::path::ChannelPath;

/// Per-channel state: `unsubscribed -> subscribing -> subscribed`.
///
/// Owned by the [`Session`](crate::Session) that created it. A subscription that
/// survives a dropped transport goes back to `subscribing` until the broker
/// acknowledges the replayed subscribe command.
pub struct Subscription {
    path: ChannelPath,
    subscribed: bool,
    created_at: Instant,
    events: EventBus<Value>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.path)
            .field("subscribed", &self.subscribed)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    fn new(path: ChannelPath) -> Self {
        Self {
            path,
            subscribed: false,
            created_at: Instant::now(),
            events: EventBus::new(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &ChannelPath {
        &self.path
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        self.path.channel()
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.path.namespace()
    }

    /// Whether the broker has acknowledged the subscription on the current transport.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.events.listener_count(event)
    }

    pub(crate) fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed;
    }

    pub(crate) fn emit(&mut self, event: &str, payload: &Value) -> usize {
        self.events.emit(event, payload)
    }
}

impl Listen<Value> for Subscription {
    fn on<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Value) + Send + 'static,
    {
        self.events.on(event, handler)
    }

    fn once<S, F>(&mut self, event: S, handler: F) -> HandlerId
    where
        S: Into<String>,
        F: FnMut(&Value) + Send + 'static,
    {
        self.events.once(event, handler)
    }

    fn off(&mut self, event: &str, id: HandlerId) -> bool {
        self.events.off(event, id)
    }
}

/// Channel path to [`Subscription`] map. At most one entry per path.
///
/// Iteration follows insertion order, so replay after a reconnect re-sends
/// subscribe commands in the order the caller originally issued them.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: IndexMap<ChannelPath, Subscription>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing subscription for `path`, or a new one. The flag is `true` when the
    /// entry was created by this call.
    pub fn get_or_insert(&mut self, path: ChannelPath) -> (&mut Subscription, bool) {
        match self.entries.entry(path) {
            indexmap::map::Entry::Occupied(entry) => (entry.into_mut(), false),
            indexmap::map::Entry::Vacant(entry) => {
                let subscription = Subscription::new(entry.key().clone());
                (entry.insert(subscription), true)
            }
        }
    }

    #[must_use]
    pub fn get(&self, path: &ChannelPath) -> Option<&Subscription> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &ChannelPath) -> Option<&mut Subscription> {
        self.entries.get_mut(path)
    }

    #[must_use]
    pub fn contains(&self, path: &ChannelPath) -> bool {
        self.entries.contains_key(path)
    }

    /// Remove the entry for `path`, keeping the order of the others.
    pub fn remove(&mut self, path: &ChannelPath) -> Option<Subscription> {
        self.entries.shift_remove(path)
    }

    /// Mark every entry as awaiting re-acknowledgement.
    pub fn reset_subscribed(&mut self) {
        for subscription in self.entries.values_mut() {
            subscription.set_subscribed(false);
        }
    }

    /// Paths to replay, in insertion order.
    #[must_use]
    pub fn paths(&self) -> Vec<ChannelPath> {
        self.entries.keys().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
