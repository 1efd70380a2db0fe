// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Event stream
//!
//! The `event_stream` module provides the process-wide publish/subscribe
//! bus. Dead-letter notices and termination events are published here;
//! application code can publish its own events and subscribe to any of
//! them.
//!
//! Dispatch is synchronous, in registration order. A panicking
//! subscriber is caught and logged; it never poisons the publisher or
//! the other subscribers.
//!

use crate::{
    error::Error,
    message::{DynMessage, MessageEnvelope, SystemMessage},
    pid::Pid,
    process::Process,
};

use async_trait::async_trait;

use parking_lot::RwLock;

use tracing::{debug, error};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifies a subscription for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: u64,
    handler: Arc<dyn Fn(&DynMessage) + Send + Sync>,
}

/// In-process publish/subscribe channel.
#[derive(Default)]
pub struct EventStream {
    subscribers: RwLock<Vec<Subscriber>>,
    next: AtomicU64,
}

impl EventStream {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber for every published event.
    ///
    /// # Arguments
    ///
    /// * `handler` - Called synchronously for each event, in
    ///   registration order relative to other subscribers.
    ///
    /// # Returns
    ///
    /// The id to pass to [`EventStream::unsubscribe`].
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let id = system.event_stream().subscribe(|event| {
    ///     if let Some(dead) = event.downcast_ref::<DeadLetterEvent>() {
    ///         tracing::warn!("dead letter for {}", dead.target);
    ///     }
    /// });
    /// ```
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DynMessage) + Send + Sync + 'static,
    {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        SubscriptionId(id)
    }

    /// Registers a subscriber that only sees events of one type.
    ///
    /// # Arguments
    ///
    /// * `handler` - Called for events that downcast to `T`; everything
    ///   else is skipped before the handler runs.
    ///
    /// # Returns
    ///
    /// The id to pass to [`EventStream::unsubscribe`].
    pub fn subscribe_filtered<T, F>(&self, handler: F) -> SubscriptionId
    where
        T: Any + Send + Sync,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let Some(event) = event.downcast_ref::<T>() {
                handler(event);
            }
        })
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers
            .write()
            .retain(|subscriber| subscriber.id != id.0);
    }

    /// Publishes an event to every subscriber, in registration order.
    ///
    /// # Arguments
    ///
    /// * `event` - The event value. Dispatch is synchronous; a
    ///   panicking subscriber is caught and logged without affecting
    ///   the others.
    pub fn publish(&self, event: &DynMessage) {
        let handlers: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|subscriber| subscriber.handler.clone())
            .collect();
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                error!("Event stream subscriber panicked; event dropped for it.");
            }
        }
    }

    /// Current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Process facade over the stream, so remote transports can publish
/// through a plain address.
pub(crate) struct EventStreamProcess {
    stream: Arc<EventStream>,
}

impl EventStreamProcess {
    pub(crate) fn new(stream: Arc<EventStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl Process for EventStreamProcess {
    async fn send_user(
        &self,
        _target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        self.stream.publish(envelope.message());
        Ok(())
    }

    async fn send_system(&self, target: &Pid, message: SystemMessage) {
        debug!("Event stream {} dropped system message {:?}.", target, message);
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use parking_lot::Mutex;

    #[test]
    fn test_publish_in_registration_order() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            stream.subscribe(move |event| {
                if let Some(value) = event.downcast_ref::<u32>() {
                    seen.lock().push((tag, *value));
                }
            });
        }
        stream.publish(&(Arc::new(7u32) as DynMessage));
        assert_eq!(*seen.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_filtered_subscription() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = seen.clone();
        stream.subscribe_filtered::<String, _>(move |event| {
            inner.lock().push(event.clone());
        });
        stream.publish(&(Arc::new(1u32) as DynMessage));
        stream.publish(&(Arc::new("hello".to_owned()) as DynMessage));
        assert_eq!(*seen.lock(), vec!["hello".to_owned()]);
    }

    #[test]
    fn test_unsubscribe() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(0u32));
        let inner = seen.clone();
        let id = stream.subscribe(move |_event| *inner.lock() += 1);
        stream.publish(&(Arc::new(1u32) as DynMessage));
        stream.unsubscribe(id);
        stream.publish(&(Arc::new(2u32) as DynMessage));
        assert_eq!(*seen.lock(), 1);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let stream = EventStream::new();
        let seen = Arc::new(Mutex::new(0u32));
        stream.subscribe(|_event| panic!("bad subscriber"));
        let inner = seen.clone();
        stream.subscribe(move |_event| *inner.lock() += 1);
        stream.publish(&(Arc::new(1u32) as DynMessage));
        assert_eq!(*seen.lock(), 1);
    }
}
