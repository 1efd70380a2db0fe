// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Props
//!
//! The `props` module provides the spawn-time recipe for an actor: the
//! producer plus every pluggable around it (mailbox shape, dispatcher,
//! supervisor strategy for its children, optional guardian strategy for
//! top-level spawns, middleware chains, context decorators and the
//! spawner itself).
//!
//! Props are immutable and shared; one `Props` value can spawn any
//! number of actors.
//!

use crate::{
    actor::{Actor, Producer},
    dispatch::Dispatcher,
    error::Error,
    mailbox::MailboxKind,
    middleware::{
        ContextDecorator, ReceiverFn, ReceiverMiddleware, SenderHook,
        build_receiver_chain,
    },
    pid::Pid,
    supervision::SupervisorStrategy,
    system::ActorSystem,
};

use std::sync::Arc;

/// Registers the address and starts the mailbox for a spawn. Replaced
/// by tests and by the remote layer's activator.
pub type Spawner = Arc<
    dyn Fn(&ActorSystem, String, Arc<Props>, Option<Pid>) -> Result<Pid, Error>
        + Send
        + Sync,
>;

/// Configuration from which actors are spawned.
pub struct Props {
    producer: Producer,
    mailbox: MailboxKind,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    supervisor: Option<Arc<dyn SupervisorStrategy>>,
    guardian: Option<Arc<dyn SupervisorStrategy>>,
    sender_hooks: Vec<SenderHook>,
    receiver_middleware: Vec<ReceiverMiddleware>,
    decorators: Vec<ContextDecorator>,
    spawner: Option<Spawner>,
}

impl Props {
    /// Creates props from a producer.
    ///
    /// # Arguments
    ///
    /// * `producer` - Builds a fresh actor instance at spawn time and
    ///   again on every restart.
    ///
    /// # Returns
    ///
    /// Props with an unbounded mailbox and no strategy, middleware or
    /// decorators; the `with_*` builders layer those on.
    pub fn from_producer(producer: Producer) -> Self {
        Self {
            producer,
            mailbox: MailboxKind::Unbounded,
            dispatcher: None,
            supervisor: None,
            guardian: None,
            sender_hooks: Vec::new(),
            receiver_middleware: Vec::new(),
            decorators: Vec::new(),
            spawner: None,
        }
    }

    /// Creates props from a plain constructor closure.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds the concrete actor; boxing is handled here.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let props = Props::from_fn(|| Counter { count: 0 });
    /// let pid = system.spawn(props)?;
    /// ```
    pub fn from_fn<A, F>(factory: F) -> Self
    where
        A: Actor,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self::from_producer(Arc::new(move || {
            Box::new(factory()) as Box<dyn Actor>
        }))
    }

    /// Selects the mailbox shape.
    pub fn with_mailbox(mut self, mailbox: MailboxKind) -> Self {
        self.mailbox = mailbox;
        self
    }

    /// Selects the dispatcher the mailbox runs on.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Sets the strategy applied to this actor's failing children.
    pub fn with_supervisor(
        mut self,
        strategy: Arc<dyn SupervisorStrategy>,
    ) -> Self {
        self.supervisor = Some(strategy);
        self
    }

    /// Attaches the spawned actor under a guardian bound to this
    /// strategy.
    ///
    /// Only valid for top-level spawns: a child spawn carrying a
    /// guardian strategy fails with an invalid-spawn error. Spawns
    /// sharing the same strategy instance share one guardian.
    pub fn with_guardian(
        mut self,
        strategy: Arc<dyn SupervisorStrategy>,
    ) -> Self {
        self.guardian = Some(strategy);
        self
    }

    /// Appends a sender hook, run in registration order.
    pub fn with_sender_hook(mut self, hook: SenderHook) -> Self {
        self.sender_hooks.push(hook);
        self
    }

    /// Appends receiver middleware, outermost first.
    pub fn with_receiver_middleware(
        mut self,
        middleware: ReceiverMiddleware,
    ) -> Self {
        self.receiver_middleware.push(middleware);
        self
    }

    /// Appends a context decorator, applied at spawn before `Started`.
    pub fn with_decorator(mut self, decorator: ContextDecorator) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Replaces the default spawner.
    pub fn with_spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub(crate) fn producer(&self) -> &Producer {
        &self.producer
    }

    pub(crate) fn mailbox(&self) -> &MailboxKind {
        &self.mailbox
    }

    pub(crate) fn dispatcher(&self) -> Option<Arc<dyn Dispatcher>> {
        self.dispatcher.clone()
    }

    pub(crate) fn supervisor(&self) -> Option<Arc<dyn SupervisorStrategy>> {
        self.supervisor.clone()
    }

    pub(crate) fn guardian(&self) -> Option<Arc<dyn SupervisorStrategy>> {
        self.guardian.clone()
    }

    pub(crate) fn sender_hooks(&self) -> &[SenderHook] {
        &self.sender_hooks
    }

    pub(crate) fn decorators(&self) -> &[ContextDecorator] {
        &self.decorators
    }

    /// Builds the composed receiver chain, or `None` for the fast path.
    pub(crate) fn receiver_chain(&self) -> Option<ReceiverFn> {
        build_receiver_chain(&self.receiver_middleware)
    }

    /// Spawns through the configured spawner under the given id.
    pub(crate) fn spawn(
        self: &Arc<Self>,
        system: &ActorSystem,
        id: String,
        parent: Option<Pid>,
    ) -> Result<Pid, Error> {
        match &self.spawner {
            Some(spawner) => spawner(system, id, self.clone(), parent),
            None => crate::context::default_spawner(
                system,
                id,
                self.clone(),
                parent,
            ),
        }
    }
}
