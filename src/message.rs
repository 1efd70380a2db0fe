// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages and envelopes
//!
//! The `message` module defines what travels through mailboxes: type
//! erased user messages wrapped in envelopes, the system message
//! vocabulary that drives lifecycles and supervision, and the built-in
//! user-level messages an actor observes (`Started`, `Stopped`,
//! `Terminated`, ...).
//!
//! User messages are `Arc<dyn Any + Send + Sync>` values. An actor
//! downcasts the current message inside `receive` and falls through to a
//! default arm for anything it does not understand.
//!

use crate::{
    actor::Actor, context::ActorContext, error::Error, pid::Pid,
    supervision::RestartStatistics,
};

use futures::future::BoxFuture;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A type-erased user message.
pub type DynMessage = Arc<dyn Any + Send + Sync>;

/// A user message together with its optional sender.
///
/// The envelope also records whether the message should reset an armed
/// receive timeout; timer-driven traffic opts out with
/// [`MessageEnvelope::without_timeout_reset`].
#[derive(Clone)]
pub struct MessageEnvelope {
    message: DynMessage,
    sender: Option<Pid>,
    resets_receive_timeout: bool,
}

impl MessageEnvelope {
    /// Wraps a message with no sender.
    pub fn new(message: impl Any + Send + Sync) -> Self {
        Self::from_dyn(Arc::new(message))
    }

    /// Wraps an already type-erased message.
    pub fn from_dyn(message: DynMessage) -> Self {
        Self {
            message,
            sender: None,
            resets_receive_timeout: true,
        }
    }

    /// Attaches the sender used for reply routing.
    pub fn with_sender(mut self, sender: Pid) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Marks the message as non-influencing: an armed receive timeout
    /// keeps its current deadline.
    pub fn without_timeout_reset(mut self) -> Self {
        self.resets_receive_timeout = false;
        self
    }

    /// The type-erased message payload.
    pub fn message(&self) -> &DynMessage {
        &self.message
    }

    /// Downcasts the payload.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.message.downcast_ref::<T>()
    }

    /// The sender, when the message was sent as a request.
    pub fn sender(&self) -> Option<&Pid> {
        self.sender.as_ref()
    }

    pub(crate) fn resets_receive_timeout(&self) -> bool {
        self.resets_receive_timeout
    }
}

impl fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEnvelope")
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

/// Why a watched process terminated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminateReason {
    /// The process ran its stop protocol to completion.
    Stopped,
    /// The remote system address hosting the process went away.
    AddressTerminated,
    /// The address could not be resolved at all.
    NotFound,
}

/// Delivered to watchers (and the parent) when a process terminates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Terminated {
    /// The process that terminated.
    pub who: Pid,
    /// Why it terminated.
    pub reason: TerminateReason,
}

/// First user-level message every actor observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Started;

/// Delivered when the stop protocol begins, before children are stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stopping;

/// Last user-level message an actor observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stopped;

/// Delivered to the failing instance before it is replaced on restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Restarting;

/// Injected after the armed receive-timeout duration of idleness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiveTimeout;

/// User message that stops the target after all earlier user messages
/// have been processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoisonPill;

/// Sent back to a requester whose message landed in dead letters, so
/// the reply future fails fast instead of waiting for its timeout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeadLetterResponse {
    /// The unreachable target.
    pub target: Pid,
}

/// Raised to a supervisor when a child's receive fails.
pub struct Failure {
    /// The failing child.
    pub who: Pid,
    /// What went wrong.
    pub reason: Error,
    /// Snapshot of the child's restart statistics, already including
    /// this failure.
    pub stats: RestartStatistics,
    /// The message being processed when the failure occurred.
    pub message: Option<MessageEnvelope>,
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("who", &self.who)
            .field("reason", &self.reason)
            .field("failures", &self.stats.failure_count())
            .finish_non_exhaustive()
    }
}

/// Deferred closure scheduled back onto the actor's own turn by
/// `ActorContext::reenter_after`, carrying the message that was current
/// when the external task was started.
pub struct Continuation {
    pub(crate) message: Option<MessageEnvelope>,
    pub(crate) action: ContinuationFn,
}

/// The boxed body of a [`Continuation`].
pub type ContinuationFn = Box<
    dyn for<'a> FnOnce(
            &'a mut dyn Actor,
            &'a mut ActorContext,
        ) -> BoxFuture<'a, ()>
        + Send,
>;

/// Control-lane messages. These always overtake user messages at the
/// mailbox and keep FIFO order among themselves.
pub enum SystemMessage {
    /// Run the start protocol and deliver `Started`.
    Start,
    /// Run the stop protocol: stop children, then finalize.
    Stop,
    /// Replace the actor instance, replaying the stash afterwards.
    Restart,
    /// Pause user-message dispatch; system messages keep flowing.
    Suspend,
    /// Resume user-message dispatch.
    Resume,
    /// Register interest in the target's termination.
    Watch { watcher: Pid },
    /// Remove a previously registered watcher.
    Unwatch { watcher: Pid },
    /// A child (or escalating descendant) failed.
    Failure(Box<Failure>),
    /// A watched or owned process terminated.
    Terminated(Terminated),
    /// Re-entry of a completed external task onto the actor's turn.
    Continuation(Continuation),
}

impl fmt::Debug for SystemMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemMessage::Start => write!(f, "Start"),
            SystemMessage::Stop => write!(f, "Stop"),
            SystemMessage::Restart => write!(f, "Restart"),
            SystemMessage::Suspend => write!(f, "Suspend"),
            SystemMessage::Resume => write!(f, "Resume"),
            SystemMessage::Watch { watcher } => {
                write!(f, "Watch({})", watcher)
            }
            SystemMessage::Unwatch { watcher } => {
                write!(f, "Unwatch({})", watcher)
            }
            SystemMessage::Failure(failure) => {
                write!(f, "Failure({:?})", failure)
            }
            SystemMessage::Terminated(terminated) => {
                write!(f, "Terminated({:?})", terminated)
            }
            SystemMessage::Continuation(_) => write!(f, "Continuation"),
        }
    }
}
