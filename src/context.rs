// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor context
//!
//! The `context` module provides the per-actor state machine. An
//! [`ActorContext`] owns everything that survives across messages and
//! restarts: lifecycle state, children, watchers, the stash, restart
//! statistics, the receive timeout and the stop token. The paired
//! [`ActorCell`] owns the actor instance itself and is the invoker the
//! mailbox drives, so actor state is only ever touched from the single
//! consumer task.
//!
//! Lifecycle transitions only move forward:
//! `Alive → Restarting → Stopping → Stopped`, where `Stopping` may
//! pre-empt `Restarting`. While stopping or restarting, user dispatch
//! is suspended and the context waits for the termination notices of
//! its children before finalizing.
//!

use crate::{
    actor::Actor,
    error::Error,
    mailbox::{self, MailboxControl, MessageInvoker},
    message::{
        Continuation, Failure, MessageEnvelope, PoisonPill, ReceiveTimeout,
        Restarting, Started, Stopped, Stopping, SystemMessage, Terminated,
        TerminateReason,
    },
    middleware::{apply_sender_hooks, ReceiverFn},
    pid::Pid,
    process::{LocalProcess, ProcessHandle},
    props::Props,
    supervision::{default_strategy, RestartStatistics, Supervisor},
    system::ActorSystem,
};

use async_trait::async_trait;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use tracing::{debug, error, warn};

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle states of a context, in transition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActorLifecycle {
    /// Accepting user messages.
    Alive,
    /// Replacing the actor instance; waiting for children to stop.
    Restarting,
    /// Running the stop protocol; waiting for children to stop.
    Stopping,
    /// Fully stopped and removed from the registry.
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingTransition {
    Restart,
    Stop,
}

/// Per-actor state and the operations exposed to actor code.
pub struct ActorContext {
    system: ActorSystem,
    pid: Pid,
    parent: Option<Pid>,
    props: Arc<Props>,
    envelope: Option<MessageEnvelope>,
    lifecycle: ActorLifecycle,
    children: Vec<Pid>,
    watchers: Vec<Pid>,
    stash: Vec<MessageEnvelope>,
    stats: RestartStatistics,
    receive_timeout: Option<Duration>,
    timeout_token: Option<CancellationToken>,
    token: CancellationToken,
    pending: Option<PendingTransition>,
}

impl ActorContext {
    pub(crate) fn new(
        system: ActorSystem,
        pid: Pid,
        parent: Option<Pid>,
        props: Arc<Props>,
    ) -> Self {
        let token = system.token().child_token();
        Self {
            system,
            pid,
            parent,
            props,
            envelope: None,
            lifecycle: ActorLifecycle::Alive,
            children: Vec::new(),
            watchers: Vec::new(),
            stash: Vec::new(),
            stats: RestartStatistics::new(),
            receive_timeout: None,
            timeout_token: None,
            token,
            pending: None,
        }
    }

    /// This actor's own pid.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// The parent pid. Only root guardians have none.
    pub fn parent(&self) -> Option<&Pid> {
        self.parent.as_ref()
    }

    /// The owning system.
    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ActorLifecycle {
        self.lifecycle
    }

    /// Pids of the live children.
    pub fn children(&self) -> &[Pid] {
        &self.children
    }

    /// Token cancelled when this actor stops (and on system shutdown).
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The envelope currently being dispatched.
    pub fn envelope(&self) -> Option<&MessageEnvelope> {
        self.envelope.as_ref()
    }

    /// Downcasts the current message.
    ///
    /// # Returns
    ///
    /// `Some` when a message is being dispatched and it is a `T`;
    /// `None` otherwise. Receive implementations chain these checks and
    /// fall through to a default arm.
    pub fn message<T: Any>(&self) -> Option<&T> {
        self.envelope.as_ref().and_then(|e| e.downcast_ref::<T>())
    }

    /// Sender of the current message, when it was a request.
    ///
    /// # Returns
    ///
    /// The pid replies should go to, or `None` for fire-and-forget
    /// traffic.
    pub fn sender(&self) -> Option<&Pid> {
        self.envelope.as_ref().and_then(|e| e.sender())
    }

    /// Spawns a child under a generated name.
    ///
    /// # Arguments
    ///
    /// * `props` - The child's spawn recipe.
    ///
    /// # Returns
    ///
    /// The child's pid. `Started` is already queued when this returns,
    /// so it precedes anything sent to the pid afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpawn`] under the same conditions as
    /// [`ActorContext::spawn_named`]; generated names themselves never
    /// collide.
    pub fn spawn(&mut self, props: Props) -> Result<Pid, Error> {
        let name = format!("${}", self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Spawns a child under a generated name with a readable prefix.
    ///
    /// # Arguments
    ///
    /// * `props` - The child's spawn recipe.
    /// * `prefix` - Leading part of the generated name, useful when
    ///   scanning logs for a family of workers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpawn`] under the same conditions as
    /// [`ActorContext::spawn_named`].
    pub fn spawn_prefix(
        &mut self,
        props: Props,
        prefix: &str,
    ) -> Result<Pid, Error> {
        let name = format!("{}-{}", prefix, self.system.registry().next_id());
        self.spawn_named(props, &name)
    }

    /// Spawns a child under an explicit name.
    ///
    /// # Arguments
    ///
    /// * `props` - The child's spawn recipe.
    /// * `name` - The child's name; the child's id becomes this
    ///   context's id extended with `/{name}`.
    ///
    /// # Returns
    ///
    /// The child's pid, already recorded in this context's children.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpawn`] when the name is already taken
    /// by a live child, when the props carry a guardian strategy (legal
    /// only for top-level spawns), or when this actor is already
    /// stopping.
    pub fn spawn_named(
        &mut self,
        props: Props,
        name: &str,
    ) -> Result<Pid, Error> {
        if props.guardian().is_some() {
            return Err(Error::InvalidSpawn(
                "guardian strategy is only valid for top-level spawns"
                    .to_owned(),
            ));
        }
        if self.lifecycle >= ActorLifecycle::Stopping {
            return Err(Error::InvalidSpawn(format!(
                "{} is stopping and cannot spawn children",
                self.pid
            )));
        }
        let props = Arc::new(props);
        let id = format!("{}/{}", self.pid.id(), name);
        let pid = props.spawn(&self.system, id, Some(self.pid.clone()))?;
        self.children.push(pid.clone());
        Ok(pid)
    }

    async fn deliver(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        let Some(envelope) =
            apply_sender_hooks(self.props.sender_hooks(), target, envelope)
        else {
            return Ok(());
        };
        self.system.deliver_user(target, envelope).await
    }

    /// Fire-and-forget send with no sender attached.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value; the target downcasts it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shutdown`] after system shutdown began and
    /// [`Error::MailboxFull`] for a full bounded mailbox with the
    /// `Fail` policy. Every other undeliverable message routes to dead
    /// letters and the send itself reports `Ok`.
    pub async fn send(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
    ) -> Result<(), Error> {
        self.deliver(target, MessageEnvelope::new(message)).await
    }

    /// Sends with this actor as the sender, so the target can respond.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ActorContext::send`].
    pub async fn request(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
    ) -> Result<(), Error> {
        let envelope =
            MessageEnvelope::new(message).with_sender(self.pid.clone());
        self.deliver(target, envelope).await
    }

    /// Sends on behalf of an explicit sender.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value.
    /// * `sender` - The pid replies should be routed to.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ActorContext::send`].
    pub async fn request_with_sender(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        sender: Pid,
    ) -> Result<(), Error> {
        let envelope = MessageEnvelope::new(message).with_sender(sender);
        self.deliver(target, envelope).await
    }

    /// Sends and awaits a typed reply through a one-shot future.
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value.
    /// * `timeout` - How long to wait for the reply.
    ///
    /// # Returns
    ///
    /// The first message the reply future receives, downcast to `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when no reply arrives in time,
    /// [`Error::DeadLetter`] when the target is stopped or unknown
    /// (failing fast, ahead of the timeout), [`Error::TypeMismatch`]
    /// when the reply is not a `T`, and [`Error::Shutdown`] when the
    /// system token cancels first.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let pong = ctx
    ///     .request_reply::<Pong>(&echo, Ping("x".into()), Duration::from_secs(1))
    ///     .await?;
    /// ```
    pub async fn request_reply<T: Any + Send + Sync>(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        timeout: Duration,
    ) -> Result<Arc<T>, Error> {
        let future = crate::future::spawn_future(&self.system, Some(timeout));
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
    ///
    /// # Arguments
    ///
    /// * `target` - The destination pid.
    /// * `message` - Any sendable value.
    /// * `timeout` - Optional reply deadline; `None` waits until the
    ///   future is completed or cancelled.
    ///
    /// # Returns
    ///
    /// The pending reply future. Combine with
    /// [`ResponseFuture::cancelled_by`](crate::ResponseFuture::cancelled_by)
    /// to tie it to an external token.
    ///
    /// # Errors
    ///
    /// Returns the delivery error when the request cannot be sent; the
    /// reply future is cleaned up before returning.
    pub async fn request_future(
        &self,
        target: &Pid,
        message: impl Any + Send + Sync,
        timeout: Option<Duration>,
    ) -> Result<crate::future::ResponseFuture, Error> {
        let future = crate::future::spawn_future(&self.system, timeout);
        let envelope =
            MessageEnvelope::new(message).with_sender(future.pid().clone());
        if let Err(error) = self.deliver(target, envelope).await {
            self.system.registry().remove(future.pid());
            return Err(error);
        }
        Ok(future)
    }

    /// Resends the current message, preserving the original sender.
    ///
    /// Only user messages can be forwarded; there is no current message
    /// outside a dispatch, in which case the call logs and does
    /// nothing.
    ///
    /// # Arguments
    ///
    /// * `target` - The pid to hand the current message to. A reply
    ///   from there reaches the original requester, not this actor.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ActorContext::send`].
    pub async fn forward(&self, target: &Pid) -> Result<(), Error> {
        match self.envelope.clone() {
            Some(envelope) => self.deliver(target, envelope).await,
            None => {
                warn!("{} has no current message to forward.", self.pid);
                Ok(())
            }
        }
    }

    /// Replies to the sender of the current message. Without a sender
    /// the reply is logged and dropped.
    ///
    /// # Arguments
    ///
    /// * `message` - The reply. This actor is attached as the sender so
    ///   replies can chain.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ActorContext::send`]. A missing sender is
    /// not an error.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// if let Some(ping) = ctx.message::<Ping>() {
    ///     ctx.respond(Pong(ping.0.clone())).await?;
    /// }
    /// ```
    pub async fn respond(
        &self,
        message: impl Any + Send + Sync,
    ) -> Result<(), Error> {
        match self.sender().cloned() {
            Some(sender) => {
                let envelope = MessageEnvelope::new(message)
                    .with_sender(self.pid.clone());
                self.deliver(&sender, envelope).await
            }
            None => {
                warn!(
                    "{} tried to respond but the current message has no sender.",
                    self.pid
                );
                Ok(())
            }
        }
    }

    /// Defers the current message; the stash replays in push order after
    /// the next restart completes.
    ///
    /// Stashing outside a dispatch logs and does nothing. The stash
    /// lives on the context, so it survives the actor instance being
    /// replaced.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// if !self.ready {
    ///     ctx.stash();
    ///     return Ok(());
    /// }
    /// ```
    pub fn stash(&mut self) {
        match self.envelope.clone() {
            Some(envelope) => self.stash.push(envelope),
            None => warn!("{} has no current message to stash.", self.pid),
        }
    }

    /// Registers interest in the target's termination. Watchers are
    /// notified exactly once, in the order they were added; watching an
    /// already-stopped address answers immediately.
    ///
    /// # Arguments
    ///
    /// * `target` - The pid to observe. On its termination this actor
    ///   receives a [`Terminated`] user message carrying the pid and
    ///   the reason.
    pub async fn watch(&self, target: &Pid) {
        let watch = SystemMessage::Watch {
            watcher: self.pid.clone(),
        };
        self.system.process(target).send_system(target, watch).await;
    }

    /// Removes a previously registered watch.
    ///
    /// # Arguments
    ///
    /// * `target` - The pid to stop observing. Unwatching a pid that
    ///   was never watched is a no-op.
    pub async fn unwatch(&self, target: &Pid) {
        let unwatch = SystemMessage::Unwatch {
            watcher: self.pid.clone(),
        };
        self.system
            .process(target)
            .send_system(target, unwatch)
            .await;
    }

    /// Stops the target ahead of queued user messages.
    ///
    /// # Arguments
    ///
    /// * `target` - The pid to stop. The stop request travels on the
    ///   system lane and overtakes pending user traffic, which is
    ///   dead-lettered.
    pub async fn stop(&self, target: &Pid) {
        self.system.stop(target).await;
    }

    /// Stops the target and returns a future resolving on termination.
    ///
    /// # Returns
    ///
    /// A future whose
    /// [`terminated`](crate::ResponseFuture::terminated) resolves with
    /// the target's termination notice, immediately if the target is
    /// already gone.
    pub async fn stop_async(&self, target: &Pid) -> crate::future::ResponseFuture {
        self.system.stop_future(target).await
    }

    /// Enqueues a poison pill: the target processes earlier user
    /// messages first, then stops.
    ///
    /// # Arguments
    ///
    /// * `target` - The pid to stop after its queued user messages.
    pub async fn poison(&self, target: &Pid) {
        self.system.poison(target).await;
    }

    /// Poisons the target and returns a future resolving on termination.
    ///
    /// # Returns
    ///
    /// A future whose
    /// [`terminated`](crate::ResponseFuture::terminated) resolves with
    /// the target's termination notice.
    pub async fn poison_async(
        &self,
        target: &Pid,
    ) -> crate::future::ResponseFuture {
        self.system.poison_future(target).await
    }

    /// Arms a timer that injects [`ReceiveTimeout`] after `duration` of
    /// idleness. Messages sent with
    /// [`MessageEnvelope::without_timeout_reset`] do not reset it.
    ///
    /// # Arguments
    ///
    /// * `duration` - The idleness threshold; must be strictly
    ///   positive. Re-arming with the unchanged duration is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimeout`] for a zero duration; an armed
    /// timer is left untouched in that case.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// if ctx.message::<Started>().is_some() {
    ///     ctx.set_receive_timeout(Duration::from_secs(30))?;
    /// } else if ctx.message::<ReceiveTimeout>().is_some() {
    ///     ctx.stop(ctx.pid()).await;
    /// }
    /// ```
    pub fn set_receive_timeout(
        &mut self,
        duration: Duration,
    ) -> Result<(), Error> {
        if duration.is_zero() {
            return Err(Error::InvalidTimeout);
        }
        if self.receive_timeout == Some(duration) {
            return Ok(());
        }
        self.receive_timeout = Some(duration);
        self.restart_receive_timer();
        Ok(())
    }

    /// Disarms the receive timeout.
    pub fn cancel_receive_timeout(&mut self) {
        self.stop_receive_timer();
        self.receive_timeout = None;
    }

    fn stop_receive_timer(&mut self) {
        if let Some(timer) = self.timeout_token.take() {
            timer.cancel();
        }
    }

    fn restart_receive_timer(&mut self) {
        self.stop_receive_timer();
        let Some(duration) = self.receive_timeout else {
            return;
        };
        if self.lifecycle != ActorLifecycle::Alive {
            return;
        }
        let timer = self.token.child_token();
        self.timeout_token = Some(timer.clone());
        let process = self.system.process(&self.pid);
        let pid = self.pid.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = timer.cancelled() => break,
                    _ = tokio::time::sleep(duration) => {
                        let envelope = MessageEnvelope::new(ReceiveTimeout)
                            .without_timeout_reset();
                        let _ = process.send_user(&pid, envelope).await;
                    }
                }
            }
        });
    }

    /// Runs an external task off-turn and re-enters the actor with its
    /// output. The actor's turn is released immediately; when the task
    /// completes, the continuation is dispatched through the system lane
    /// with the message that was current at call time restored.
    ///
    /// This is the only supported way to interleave an external await
    /// with other messages.
    ///
    /// # Arguments
    ///
    /// * `task` - The external future, run outside the actor's turn.
    /// * `continuation` - Runs on the actor's own turn with the task's
    ///   output; it downcasts the actor to reach its state.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// fn applied<'a>(
    ///     actor: &'a mut dyn Actor,
    ///     ctx: &'a mut ActorContext,
    ///     price: u64,
    /// ) -> BoxFuture<'a, ()> {
    ///     Box::pin(async move {
    ///         if let Some(quoter) = actor.downcast_mut::<Quoter>() {
    ///             quoter.last_price = price;
    ///         }
    ///     })
    /// }
    /// ctx.reenter_after(fetch_price(), applied);
    /// ```
    pub fn reenter_after<T, Fut, F>(&self, task: Fut, continuation: F)
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        F: for<'a> FnOnce(
                &'a mut dyn Actor,
                &'a mut ActorContext,
                T,
            ) -> BoxFuture<'a, ()>
            + Send
            + 'static,
    {
        let message = self.envelope.clone();
        let process = self.system.process(&self.pid);
        let pid = self.pid.clone();
        tokio::spawn(async move {
            let output = task.await;
            let continuation = Continuation {
                message,
                action: Box::new(move |actor, ctx| {
                    continuation(actor, ctx, output)
                }),
            };
            process
                .send_system(&pid, SystemMessage::Continuation(continuation))
                .await;
        });
    }
}

#[async_trait]
impl Supervisor for ActorContext {
    fn children(&self) -> Vec<Pid> {
        self.children.clone()
    }

    async fn escalate(&mut self, failure: Failure) {
        self.stats.fail();
        let escalated = Failure {
            who: self.pid.clone(),
            reason: failure.reason,
            stats: self.stats.clone(),
            message: failure.message,
        };
        match &self.parent {
            Some(parent) => {
                debug!("{} escalating failure to {}.", self.pid, parent);
                self.system
                    .process(parent)
                    .send_system(
                        parent,
                        SystemMessage::Failure(Box::new(escalated)),
                    )
                    .await;
            }
            None => {
                error!(
                    "{} has no parent to escalate to; failure dropped.",
                    self.pid
                );
            }
        }
    }
}

/// Owns the actor instance and drives it from mailbox turns.
pub(crate) struct ActorCell {
    actor: Option<Box<dyn Actor>>,
    ctx: ActorContext,
    receiver_chain: Option<ReceiverFn>,
}

impl ActorCell {
    pub(crate) fn new(
        actor: Box<dyn Actor>,
        ctx: ActorContext,
        receiver_chain: Option<ReceiverFn>,
    ) -> Self {
        Self {
            actor: Some(actor),
            ctx,
            receiver_chain,
        }
    }

    async fn run_receive(
        &mut self,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        let Some(actor) = self.actor.as_deref_mut() else {
            return Ok(());
        };
        self.ctx.envelope = Some(envelope);
        let result = match &self.receiver_chain {
            Some(chain) => chain.clone()(actor, &mut self.ctx).await,
            None => actor.receive(&mut self.ctx).await,
        };
        self.ctx.envelope = None;
        result
    }

    /// Delivers a runtime-generated user message; failures escalate.
    async fn deliver_auto(
        &mut self,
        message: impl Any + Send + Sync,
    ) -> MailboxControl {
        match self.run_receive(MessageEnvelope::new(message)).await {
            Ok(()) => MailboxControl::Continue,
            Err(reason) => self.raise_failure(reason, None).await,
        }
    }

    /// Delivers a runtime-generated user message on the stop path, where
    /// failures can only be logged.
    async fn deliver_quiet(&mut self, message: impl Any + Send + Sync) {
        if let Err(reason) =
            self.run_receive(MessageEnvelope::new(message)).await
        {
            error!(
                "{} failed during shutdown delivery: {}.",
                self.ctx.pid, reason
            );
        }
    }

    async fn raise_failure(
        &mut self,
        reason: Error,
        message: Option<MessageEnvelope>,
    ) -> MailboxControl {
        self.ctx.stats.fail();
        debug!("{} failed: {}.", self.ctx.pid, reason);
        let failure = Failure {
            who: self.ctx.pid.clone(),
            reason,
            stats: self.ctx.stats.clone(),
            message,
        };
        match self.ctx.parent.clone() {
            Some(parent) => {
                self.ctx
                    .system
                    .process(&parent)
                    .send_system(
                        &parent,
                        SystemMessage::Failure(Box::new(failure)),
                    )
                    .await;
                MailboxControl::Suspend
            }
            None => {
                // A parentless context has no supervisor; stop
                // defensively.
                error!(
                    "{} failed without a supervisor; stopping.",
                    self.ctx.pid
                );
                self.begin_stop().await
            }
        }
    }

    async fn supervise(&mut self, failure: Failure) {
        let strategy = self
            .ctx
            .props
            .supervisor()
            .unwrap_or_else(default_strategy);
        let system = self.ctx.system.clone();
        strategy
            .handle_failure(&system, &mut self.ctx, failure)
            .await;
    }

    async fn begin_stop(&mut self) -> MailboxControl {
        if self.ctx.lifecycle >= ActorLifecycle::Stopping {
            return MailboxControl::Continue;
        }
        debug!("{} is stopping.", self.ctx.pid);
        self.ctx.lifecycle = ActorLifecycle::Stopping;
        self.ctx.cancel_receive_timeout();
        self.deliver_quiet(Stopping).await;
        if self.ctx.children.is_empty() {
            self.finalize_stop().await;
            MailboxControl::Terminate
        } else {
            self.ctx.pending = Some(PendingTransition::Stop);
            self.stop_children().await;
            MailboxControl::Suspend
        }
    }

    async fn begin_restart(&mut self) -> MailboxControl {
        if self.ctx.lifecycle >= ActorLifecycle::Stopping {
            // Stopping pre-empts a restart in flight.
            return MailboxControl::Continue;
        }
        debug!("{} is restarting.", self.ctx.pid);
        self.ctx.lifecycle = ActorLifecycle::Restarting;
        self.ctx.cancel_receive_timeout();
        self.deliver_quiet(Restarting).await;
        if self.ctx.children.is_empty() {
            self.complete_restart().await
        } else {
            self.ctx.pending = Some(PendingTransition::Restart);
            self.stop_children().await;
            MailboxControl::Suspend
        }
    }

    async fn stop_children(&mut self) {
        for child in self.ctx.children.clone() {
            self.ctx
                .system
                .process(&child)
                .send_system(&child, SystemMessage::Stop)
                .await;
        }
    }

    async fn complete_restart(&mut self) -> MailboxControl {
        debug!("{} replacing its actor instance.", self.ctx.pid);
        // Drop the old instance before producing the replacement.
        self.actor = None;
        self.actor = Some((self.ctx.props.producer())());
        self.ctx.lifecycle = ActorLifecycle::Alive;
        self.ctx.pending = None;
        let control = self.deliver_auto(Started).await;
        if control != MailboxControl::Continue {
            return control;
        }
        let mut stashed: std::collections::VecDeque<_> =
            self.ctx.stash.drain(..).collect();
        while let Some(envelope) = stashed.pop_front() {
            if let Err(reason) = self.run_receive(envelope.clone()).await {
                // Keep the rest of the stash for the next incarnation.
                self.ctx.stash.extend(stashed);
                return self.raise_failure(reason, Some(envelope)).await;
            }
        }
        MailboxControl::Resume
    }

    async fn finalize_stop(&mut self) {
        self.deliver_quiet(Stopped).await;
        // The registry entry disappears before any watcher hears about
        // the stop, so lookups can never resurrect this address.
        self.ctx.system.registry().remove(&self.ctx.pid);
        let notice = Terminated {
            who: self.ctx.pid.clone(),
            reason: TerminateReason::Stopped,
        };
        let mut recipients: Vec<Pid> = self.ctx.watchers.drain(..).collect();
        if let Some(parent) = self.ctx.parent.clone() {
            if !recipients.contains(&parent) {
                recipients.push(parent);
            }
        }
        for watcher in recipients {
            self.ctx
                .system
                .process(&watcher)
                .send_system(
                    &watcher,
                    SystemMessage::Terminated(notice.clone()),
                )
                .await;
        }
        self.ctx
            .system
            .event_stream()
            .publish(&(Arc::new(notice) as crate::message::DynMessage));
        self.ctx.lifecycle = ActorLifecycle::Stopped;
        self.ctx.pending = None;
        self.ctx.token.cancel();
        self.actor = None;
        debug!("{} is stopped.", self.ctx.pid);
    }

    async fn handle_terminated(
        &mut self,
        terminated: Terminated,
    ) -> MailboxControl {
        self.ctx.children.retain(|child| child != &terminated.who);
        let control = if self.ctx.lifecycle == ActorLifecycle::Alive {
            self.deliver_auto(terminated.clone()).await
        } else {
            self.deliver_quiet(terminated.clone()).await;
            MailboxControl::Continue
        };
        if self.ctx.children.is_empty() {
            match self.ctx.pending {
                Some(PendingTransition::Stop) => {
                    self.finalize_stop().await;
                    return MailboxControl::Terminate;
                }
                Some(PendingTransition::Restart) => {
                    return self.complete_restart().await;
                }
                None => {}
            }
        }
        control
    }

    async fn run_continuation(
        &mut self,
        continuation: Continuation,
    ) -> MailboxControl {
        let Some(actor) = self.actor.as_deref_mut() else {
            return MailboxControl::Continue;
        };
        self.ctx.envelope = continuation.message;
        (continuation.action)(actor, &mut self.ctx).await;
        self.ctx.envelope = None;
        MailboxControl::Continue
    }
}

#[async_trait]
impl MessageInvoker for ActorCell {
    async fn invoke_system(
        &mut self,
        message: SystemMessage,
    ) -> MailboxControl {
        match message {
            SystemMessage::Start => {
                debug!("{} started.", self.ctx.pid);
                self.deliver_auto(Started).await
            }
            SystemMessage::Stop => self.begin_stop().await,
            SystemMessage::Restart => self.begin_restart().await,
            SystemMessage::Suspend => MailboxControl::Suspend,
            SystemMessage::Resume => MailboxControl::Resume,
            SystemMessage::Watch { watcher } => {
                if self.ctx.lifecycle >= ActorLifecycle::Stopping {
                    let notice = SystemMessage::Terminated(Terminated {
                        who: self.ctx.pid.clone(),
                        reason: TerminateReason::Stopped,
                    });
                    self.ctx
                        .system
                        .process(&watcher)
                        .send_system(&watcher, notice)
                        .await;
                } else if !self.ctx.watchers.contains(&watcher) {
                    self.ctx.watchers.push(watcher);
                }
                MailboxControl::Continue
            }
            SystemMessage::Unwatch { watcher } => {
                self.ctx.watchers.retain(|w| w != &watcher);
                MailboxControl::Continue
            }
            SystemMessage::Failure(failure) => {
                self.supervise(*failure).await;
                MailboxControl::Continue
            }
            SystemMessage::Terminated(terminated) => {
                self.handle_terminated(terminated).await
            }
            SystemMessage::Continuation(continuation) => {
                self.run_continuation(continuation).await
            }
        }
    }

    async fn invoke_user(
        &mut self,
        envelope: MessageEnvelope,
    ) -> MailboxControl {
        if self.ctx.lifecycle == ActorLifecycle::Stopped {
            self.dead_letter(envelope).await;
            return MailboxControl::Continue;
        }
        if envelope.downcast_ref::<PoisonPill>().is_some() {
            return self.begin_stop().await;
        }
        let influences = envelope.resets_receive_timeout()
            && self.ctx.receive_timeout.is_some();
        if influences {
            self.ctx.stop_receive_timer();
        }
        let result = self.run_receive(envelope.clone()).await;
        if influences {
            self.ctx.restart_receive_timer();
        }
        match result {
            Ok(()) => MailboxControl::Continue,
            Err(reason) => self.raise_failure(reason, Some(envelope)).await,
        }
    }

    async fn dead_letter(&mut self, envelope: MessageEnvelope) {
        let _ = self
            .ctx
            .system
            .dead_letter_process()
            .send_user(&self.ctx.pid, envelope)
            .await;
    }
}

/// Registers the address, wires the mailbox and schedules the consumer.
/// This is the spawner used when props do not replace it.
pub(crate) fn default_spawner(
    system: &ActorSystem,
    id: String,
    props: Arc<Props>,
    parent: Option<Pid>,
) -> Result<Pid, Error> {
    let pid = Pid::new(system.address(), id.clone());
    let (sender, mailbox) =
        mailbox::mailbox(props.mailbox(), system.config().throughput);
    let process: ProcessHandle =
        Arc::new(LocalProcess::new(sender.clone(), system.downgrade()));
    if !system.registry().try_add(&id, process) {
        return Err(Error::InvalidSpawn(format!(
            "name '{}' is already in use",
            id
        )));
    }
    debug!("Spawning actor {}.", pid);
    let mut ctx =
        ActorContext::new(system.clone(), pid.clone(), parent, props.clone());
    for decorator in props.decorators() {
        decorator(&mut ctx);
    }
    let cell = ActorCell::new((props.producer())(), ctx, props.receiver_chain());
    // The start notice is queued before the pid escapes, so `Started`
    // precedes any user message.
    let _ = sender.post_system(SystemMessage::Start);
    let dispatcher = props
        .dispatcher()
        .unwrap_or_else(|| system.dispatcher());
    dispatcher.schedule(Box::pin(mailbox.run(Box::new(cell))));
    Ok(pid)
}
