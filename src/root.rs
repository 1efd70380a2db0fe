// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Root context
//!
//! The `root` module provides the sender/spawner surface used from
//! outside any actor: application startup code, tests, and anything
//! else that needs to talk to the tree without being part of it.
//! Actors spawned here are attached under the root guardian, or under a
//! strategy-specific guardian when their props carry one.
//!

use crate::{
    error::Error,
    future::{spawn_future, ResponseFuture},
    message::MessageEnvelope,
    middleware::{apply_sender_hooks, SenderHook},
    pid::Pid,
    props::Props,
    system::ActorSystem,
};

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Parentless context for code outside the actor tree.
#[derive(Clone)]
pub struct RootContext {
    system: ActorSystem,
    sender_hooks: Vec<SenderHook>,
}

impl RootContext {
    pub(crate) fn new(system: ActorSystem) -> Self {
        Self {
            system,
            sender_hooks: Vec::new(),
        }
    }

    /// Appends a sender hook applied to messages sent from this root.
    pub fn with_sender_hook(mut self, hook: SenderHook) -> Self {
        self.sender_hooks.push(hook);
        self
    }

    /// The owning system.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Spawns a top-level actor under a generated name.
    pub fn spawn(&self, props: Props) -> Result<Pid, Error> {
        let name = format!("${}", self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Spawns a top-level actor under a generated name with a readable
    /// prefix.
    pub fn spawn_prefix(
        &self,
        props: Props,
        prefix: &str,
    ) -> Result<Pid, Error> {
        let name = format!("{}-{}", prefix, self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Spawns a top-level actor under an explicit name. Props carrying a
    /// guardian strategy attach under the matching guardian.
    ///
    /// # Arguments
    ///
    /// * `props` - The actor's spawn recipe.
    /// * `name` - The actor's name under its guardian.
    ///
    /// # Returns
    ///
    /// The new actor's pid, registered with its guardian for
    /// supervision and shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpawn`] when the name is already taken
    /// under the same guardian.
    pub fn spawn_named(&self, props: Props, name: &str) -> Result<Pid, Error> {
        let props = Arc::new(props);
        let guardian = match props.guardian() {
            Some(strategy) => self
                .system
                .guardians()
                .guardian_for(&self.system, &strategy),
            None => self.system.root_guardian().clone(),
        };
        let parent = guardian.pid().clone();
        let id = format!("{}/{}", parent.id(), name);
        let pid = props.spawn(&self.system, id, Some(parent))?;
        guardian.register_child(pid.clone());
        Ok(pid)
    }

    async fn deliver(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        let Some(envelope) =
            apply_sender_hooks(&self.sender_hooks, target, envelope)
        else {
            return Ok(());
        };
        self.system.deliver_user(target, envelope).await
    }

    /// Fire-and-forget send.
    pub async fn send(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
    ) -> Result<(), Error> {
        self.deliver(target, MessageEnvelope::new(message)).await
    }

    /// Sends on behalf of an explicit sender.
    pub async fn request_with_sender(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        sender: Pid,
    ) -> Result<(), Error> {
        self.deliver(target, MessageEnvelope::new(message).with_sender(sender))
            .await
    }

    /// Sends and awaits a typed reply.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value.
    /// * `timeout` - How long to wait for the reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], [`Error::DeadLetter`],
    /// [`Error::TypeMismatch`] or [`Error::Shutdown`], exactly as
    /// [`crate::ActorContext::request_reply`] does from inside an
    /// actor.
    pub async fn request_reply<T: Any + Send + Sync>(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        timeout: Duration,
    ) -> Result<Arc<T>, Error> {
        let future = spawn_future(&self.system, Some(timeout));
        let envelope =
            MessageEnvelope::new(message).with_sender(future.pid().clone());
        if let Err(error) = self.deliver(target, envelope).await {
            self.system.registry().remove(future.pid());
            return Err(error);
        }
        future.recv::<T>().await
    }

    /// Sends a request and hands back the reply future, for callers
    /// that tie completion to their own cancellation token instead of
    /// (or in addition to) a timeout.
    pub async fn request_future(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture, Error> {
        let future = spawn_future(&self.system, timeout);
        let envelope =
            MessageEnvelope::new(message).with_sender(future.pid().clone());
        if let Err(error) = self.deliver(target, envelope).await {
            self.system.registry().remove(future.pid());
            return Err(error);
        }
        Ok(future)
    }

    /// Stops the target ahead of queued user messages.
    pub async fn stop(&self, target: &Pid) {
        self.system.stop(target).await;
    }

    /// Stops the target and resolves when it has terminated.
    pub async fn stop_async(&self, target: &Pid) -> ResponseFuture {
        self.system.stop_future(target).await
    }

    /// Stops the target after its queued user messages.
    pub async fn poison(&self, target: &Pid) {
        self.system.poison(target).await;
    }

    /// Poisons the target and resolves when it has terminated.
    pub async fn poison_async(&self, target: &Pid) -> ResponseFuture {
        self.system.poison_future(target).await
    }
}
