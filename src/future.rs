// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Reply futures
//!
//! The `future` module provides the one-shot process used as a reply
//! address for request/reply. The process completes with the first user
//! message it receives and removes itself from the registry; later
//! messages route to dead letters. A timeout, an external cancellation,
//! or system shutdown completes the future with the matching error.
//!

use crate::{
    error::Error,
    message::{
        DeadLetterResponse, MessageEnvelope, SystemMessage, Terminated,
    },
    pid::Pid,
    process::{Process, ProcessHandle},
    system::{ActorSystem, WeakSystem},
};

use async_trait::async_trait;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use tracing::debug;

use std::any::{type_name, Any};
use std::sync::Arc;
use std::time::Duration;

/// Process side of a reply future: first message wins.
pub(crate) struct FutureProcess {
    slot: Mutex<Option<oneshot::Sender<MessageEnvelope>>>,
    system: WeakSystem,
}

impl FutureProcess {
    fn remove_self(&self, target: &Pid) {
        if let Some(system) = self.system.upgrade() {
            system.registry().remove(target);
        }
    }
}

#[async_trait]
impl Process for FutureProcess {
    async fn send_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        let slot = self.slot.lock().take();
        match slot {
            Some(sender) => {
                self.remove_self(target);
                let _ = sender.send(envelope);
            }
            None => {
                debug!("Reply future {} already completed.", target);
                if let Some(system) = self.system.upgrade() {
                    let _ = system
                        .dead_letter_process()
                        .send_user(target, envelope)
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn send_system(&self, target: &Pid, message: SystemMessage) {
        match message {
            // Termination notices complete the future: this is what
            // `stop_async`/`poison_async` await on.
            SystemMessage::Terminated(terminated) => {
                let _ = self
                    .send_user(target, MessageEnvelope::new(terminated))
                    .await;
            }
            SystemMessage::Stop => {
                self.remove_self(target);
                self.slot.lock().take();
            }
            other => {
                debug!(
                    "Reply future {} dropped system message {:?}.",
                    target, other
                );
            }
        }
    }
}

/// Awaitable half of a reply future.
pub struct ResponseFuture {
    pid: Pid,
    receiver: oneshot::Receiver<MessageEnvelope>,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
    system: WeakSystem,
}

impl ResponseFuture {
    /// The reply address; attach it as the sender of a request.
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Ties completion to an external token in addition to the system
    /// shutdown token.
    ///
    /// # Arguments
    ///
    /// * `token` - Cancelling it completes the future with a shutdown
    ///   error; either token firing is enough.
    ///
    /// # Returns
    ///
    /// The same future, rebound to the combined token.
    pub fn cancelled_by(mut self, token: CancellationToken) -> Self {
        let combined = CancellationToken::new();
        let ours = self.cancellation.clone();
        let theirs = token;
        let child = combined.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = ours.cancelled() => {}
                _ = theirs.cancelled() => {}
            }
            child.cancel();
        });
        self.cancellation = combined;
        self
    }

    /// Waits for the raw reply envelope.
    ///
    /// # Returns
    ///
    /// The first envelope the future's process received.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when the deadline passes first,
    /// [`Error::Shutdown`] on cancellation (external token or system
    /// shutdown), and [`Error::DeadLetter`] when the reply is a
    /// dead-letter response. Expired and cancelled futures remove
    /// themselves from the registry.
    pub async fn result(self) -> Result<MessageEnvelope, Error> {
        let ResponseFuture {
            pid,
            receiver,
            timeout,
            cancellation,
            system,
        } = self;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let envelope = tokio::select! {
            received = receiver => match received {
                Ok(envelope) => envelope,
                Err(_) => return Err(Error::Shutdown),
            },
            _ = deadline => {
                if let Some(system) = system.upgrade() {
                    system.registry().remove(&pid);
                }
                return Err(Error::Timeout);
            }
            _ = cancellation.cancelled() => {
                if let Some(system) = system.upgrade() {
                    system.registry().remove(&pid);
                }
                return Err(Error::Shutdown);
            }
        };
        if let Some(response) = envelope.downcast_ref::<DeadLetterResponse>() {
            return Err(Error::DeadLetter(response.target.to_string()));
        }
        Ok(envelope)
    }

    /// Waits for a reply of a known type.
    ///
    /// # Returns
    ///
    /// The reply downcast to `T`, shared because messages are
    /// reference-counted.
    ///
    /// # Errors
    ///
    /// Everything [`ResponseFuture::result`] reports, plus
    /// [`Error::TypeMismatch`] when the reply is not a `T`.
    pub async fn recv<T: Any + Send + Sync>(self) -> Result<Arc<T>, Error> {
        let envelope = self.result().await?;
        envelope
            .message()
            .clone()
            .downcast::<T>()
            .map_err(|_| Error::TypeMismatch(type_name::<T>().to_owned()))
    }

    /// Waits for a termination notice, as produced by
    /// `stop_async`/`poison_async`.
    ///
    /// # Returns
    ///
    /// The notice naming the terminated pid and the reason.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ResponseFuture::recv`].
    pub async fn terminated(self) -> Result<Terminated, Error> {
        let notice = self.recv::<Terminated>().await?;
        Ok((*notice).clone())
    }
}

/// Registers a fresh one-shot reply process tied to system shutdown.
pub(crate) fn spawn_future(
    system: &ActorSystem,
    timeout: Option<Duration>,
) -> ResponseFuture {
    spawn_future_with(system, timeout, system.token().child_token())
}

/// Registers a fresh one-shot reply process with an explicit
/// cancellation token. Shutdown itself uses an inert token so its own
/// termination futures keep resolving while the tree drains.
pub(crate) fn spawn_future_with(
    system: &ActorSystem,
    timeout: Option<Duration>,
    cancellation: CancellationToken,
) -> ResponseFuture {
    let registry = system.registry();
    let id = format!("$f{}", registry.next_id());
    let pid = Pid::new(registry.address(), id);
    let (sender, receiver) = oneshot::channel();
    let process: ProcessHandle = Arc::new(FutureProcess {
        slot: Mutex::new(Some(sender)),
        system: system.downgrade(),
    });
    // Token ids never collide with spawned names, so this cannot fail.
    registry.try_add(pid.id(), process);
    ResponseFuture {
        pid,
        receiver,
        timeout,
        cancellation,
        system: system.downgrade(),
    }
}
