// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor system
//!
//! The `system` module provides the composition root owning the process
//! registry, the event stream, the dead-letter sink, the guardians and
//! the shutdown token. Systems are independent: tests create and tear
//! down as many as they need, and nothing is process-global.
//!

use crate::{
    config::SystemConfig,
    dead_letter::DeadLetterProcess,
    dispatch::{default_dispatcher, Dispatcher},
    error::Error,
    event_stream::{EventStream, EventStreamProcess},
    future::{spawn_future_with, ResponseFuture},
    guardian::{GuardianProcess, Guardians},
    message::{MessageEnvelope, PoisonPill, SystemMessage},
    pid::Pid,
    process::ProcessHandle,
    props::Props,
    registry::ProcessRegistry,
    root::RootContext,
    supervision::default_strategy,
};

use tokio_util::sync::CancellationToken;

use tracing::{debug, info};

use std::sync::{Arc, Weak};

struct SystemInner {
    config: SystemConfig,
    registry: ProcessRegistry,
    event_stream: Arc<EventStream>,
    dead_letter: ProcessHandle,
    root_guardian: Arc<GuardianProcess>,
    guardians: Guardians,
    dispatcher: Arc<dyn Dispatcher>,
    token: CancellationToken,
}

/// Handle to one actor system. Clones share the same system.
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<SystemInner>,
}

/// Non-owning system handle held by processes, so the registry owning
/// them does not keep the system alive cyclically.
#[derive(Clone)]
pub(crate) struct WeakSystem(Weak<SystemInner>);

impl WeakSystem {
    pub(crate) fn upgrade(&self) -> Option<ActorSystem> {
        self.0.upgrade().map(|inner| ActorSystem { inner })
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorSystem {
    /// Creates a system with default configuration.
    pub fn new() -> Self {
        Self::with_config(SystemConfig::default())
    }

    /// Creates a system with the given configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - Address, throughput, dead-letter throttle and root
    ///   supervisor settings.
    ///
    /// # Returns
    ///
    /// A running system with its root guardian, dead-letter sink and
    /// event-stream process registered. Systems are independent; tests
    /// create and drop as many as they need.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let system = ActorSystem::with_config(
    ///     SystemConfig::default().with_address("node-1:4020"),
    /// );
    /// assert_eq!(system.address(), "node-1:4020");
    /// ```
    pub fn with_config(config: SystemConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<SystemInner>| {
            let registry = ProcessRegistry::new(config.address.clone());
            let dead_letter: ProcessHandle = Arc::new(DeadLetterProcess::new(
                WeakSystem(weak.clone()),
                config.dead_letter_throttle_count,
                config.dead_letter_throttle_interval,
            ));
            let root_strategy = config
                .root_supervisor
                .clone()
                .unwrap_or_else(default_strategy);
            let root_guardian = GuardianProcess::new(
                Pid::new(&config.address, "root"),
                WeakSystem(weak.clone()),
                root_strategy,
            );
            SystemInner {
                config,
                registry,
                event_stream: Arc::new(EventStream::new()),
                dead_letter,
                root_guardian,
                guardians: Guardians::new(),
                dispatcher: default_dispatcher(),
                token: CancellationToken::new(),
            }
        });
        let system = ActorSystem { inner };
        system
            .inner
            .registry
            .install_dead_letter(system.inner.dead_letter.clone());
        system.inner.registry.try_add(
            system.inner.root_guardian.pid().id(),
            system.inner.root_guardian.clone(),
        );
        let stream_process: ProcessHandle = Arc::new(EventStreamProcess::new(
            system.inner.event_stream.clone(),
        ));
        system.inner.registry.try_add("$eventstream", stream_process);
        debug!("Actor system '{}' created.", system.address());
        system
    }

    /// The local system address.
    pub fn address(&self) -> &str {
        self.inner.registry.address()
    }

    /// The configuration the system was built with.
    pub fn config(&self) -> &SystemConfig {
        &self.inner.config
    }

    /// The system-wide shutdown token.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// The process-wide publish/subscribe bus.
    pub fn event_stream(&self) -> &EventStream {
        &self.inner.event_stream
    }

    /// The process registry.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.inner.registry
    }

    /// Number of registered processes, guardians included.
    pub fn process_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// A sender/spawner context usable from outside any actor.
    pub fn root(&self) -> RootContext {
        RootContext::new(self.clone())
    }

    /// Spawns a top-level actor under a generated name.
    ///
    /// # Arguments
    ///
    /// * `props` - The actor's spawn recipe.
    ///
    /// # Returns
    ///
    /// The new actor's pid, parented under the root guardian.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpawn`] when a custom spawner rejects
    /// the spawn; generated top-level names never collide.
    pub fn spawn(&self, props: Props) -> Result<Pid, Error> {
        self.root().spawn(props)
    }

    /// Resolves a pid to its process; dead letters when unknown.
    ///
    /// # Arguments
    ///
    /// * `pid` - The address to resolve. Non-local system addresses go
    ///   through the remote resolver seam.
    ///
    /// # Returns
    ///
    /// A process handle that always accepts sends; resolution never
    /// fails, it degrades to the dead-letter sink.
    pub fn process(&self, pid: &Pid) -> ProcessHandle {
        self.inner.registry.get(pid)
    }

    pub(crate) fn downgrade(&self) -> WeakSystem {
        WeakSystem(Arc::downgrade(&self.inner))
    }

    pub(crate) fn dead_letter_process(&self) -> ProcessHandle {
        self.inner.dead_letter.clone()
    }

    pub(crate) fn root_guardian(&self) -> &Arc<GuardianProcess> {
        &self.inner.root_guardian
    }

    pub(crate) fn guardians(&self) -> &Guardians {
        &self.inner.guardians
    }

    pub(crate) fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.inner.dispatcher.clone()
    }

    /// Delivers a user envelope, rejecting sends after shutdown.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `envelope` - The message plus optional sender and timeout
    ///   influence flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] once the system token is cancelled
    /// and [`Error::MailboxFull`] for a full `Fail`-policy mailbox.
    pub async fn deliver_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        if self.inner.token.is_cancelled() {
            return Err(Error::Shutdown);
        }
        self.process(target).send_user(target, envelope).await
    }

    /// Directs the target to process its next message after a failure.
    pub async fn resume(&self, target: &Pid) {
        self.process(target)
            .send_system(target, SystemMessage::Resume)
            .await;
    }

    /// Directs the target to replace its actor instance.
    pub async fn restart(&self, target: &Pid) {
        self.process(target)
            .send_system(target, SystemMessage::Restart)
            .await;
    }

    /// Stops the target ahead of queued user messages.
    pub async fn stop(&self, target: &Pid) {
        self.process(target)
            .send_system(target, SystemMessage::Stop)
            .await;
    }

    /// Stops the target once it has processed all earlier user messages.
    pub async fn poison(&self, target: &Pid) {
        let _ = self
            .process(target)
            .send_user(target, MessageEnvelope::new(PoisonPill))
            .await;
    }

    /// Stops the target and resolves when it has terminated.
    pub async fn stop_future(&self, target: &Pid) -> ResponseFuture {
        let future = self.termination_future(target).await;
        self.stop(target).await;
        future
    }

    /// Poisons the target and resolves when it has terminated.
    pub async fn poison_future(&self, target: &Pid) -> ResponseFuture {
        let future = self.termination_future(target).await;
        self.poison(target).await;
        future
    }

    async fn termination_future(&self, target: &Pid) -> ResponseFuture {
        // Not tied to the shutdown token: these futures must keep
        // resolving while shutdown drains the tree.
        let future = spawn_future_with(self, None, CancellationToken::new());
        let watch = SystemMessage::Watch {
            watcher: future.pid().clone(),
        };
        self.process(target).send_system(target, watch).await;
        future
    }

    /// Cancels the system token, stops every top-level actor and waits
    /// until their subtrees have terminated and the registry is drained.
    ///
    /// # Returns
    ///
    /// Returns once the registry is empty: actors stopped, guardians
    /// and the event-stream process deregistered. Calling it again is a
    /// no-op.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// system.shutdown().await;
    /// assert_eq!(system.process_count(), 0);
    /// ```
    pub async fn shutdown(&self) {
        if self.inner.token.is_cancelled() {
            return;
        }
        info!("Actor system '{}' shutting down.", self.address());
        self.inner.token.cancel();
        let mut guardians = vec![self.inner.root_guardian.clone()];
        guardians.extend(self.inner.guardians.all());
        let mut pending = Vec::new();
        for guardian in &guardians {
            for child in guardian.children() {
                pending.push(self.stop_future(&child).await);
            }
        }
        for future in pending {
            let _ = future.terminated().await;
        }
        for guardian in &guardians {
            self.inner.registry.remove(guardian.pid());
        }
        self.inner
            .registry
            .remove(&Pid::new(self.address(), "$eventstream"));
        debug!(
            "Actor system '{}' stopped; {} registry entries remain.",
            self.address(),
            self.inner.registry.len()
        );
    }
}
