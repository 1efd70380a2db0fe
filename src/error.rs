// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Runtime error types
//!
//! The `error` module defines the error conditions surfaced by the actor
//! runtime: request/reply failures, spawn misuse, delivery problems and
//! failures raised inside actor code. The enum is cheap to clone so that
//! failures can travel inside supervision messages.
//!

use thiserror::Error;

/// Errors produced by the actor runtime.
///
/// Every fallible operation of the crate reports through this enum, so
/// callers match one type whether a failure came from a reply future, a
/// spawn, a bounded mailbox or the actor's own receive. Values are
/// `Clone + PartialEq`: failures are carried inside supervision
/// messages and asserted directly in tests.
///
/// # Error Categories
///
/// ## Request/Reply
/// - **Timeout**: the reply future expired
/// - **DeadLetter**: the target was stopped or unknown
/// - **TypeMismatch**: the reply could not be downcast
///
/// ## Spawning
/// - **InvalidSpawn**: duplicate name, misplaced guardian strategy, or
///   a rejected custom spawner
///
/// ## Actor Code and Supervision
/// - **ActorFailure**: raised inside receive, routed to the supervisor
/// - **SupervisorEscalated**: a retry budget ran out
///
/// ## Delivery
/// - **Shutdown**: the system token was already cancelled
/// - **MailboxFull**: a bounded mailbox with the `Fail` policy was full
/// - **Send**: the message could not be handed to its target
/// - **InvalidTimeout**: a non-positive receive-timeout duration
///
/// # Examples
///
/// ```ignore
/// match root.request_reply::<Pong>(&pid, Ping, Duration::from_secs(1)).await {
///     Ok(pong) => println!("got {:?}", pong),
///     Err(Error::Timeout) => println!("no reply in time"),
///     Err(Error::DeadLetter(who)) => println!("{} is gone", who),
///     Err(error) => return Err(error),
/// }
/// ```
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A reply future expired before any message arrived.
    ///
    /// # Context
    ///
    /// Returned by `request_reply` and by `ResponseFuture::recv` when
    /// the configured timeout elapses first. The future removes itself
    /// from the registry, so a late reply routes to dead letters.
    ///
    /// # Recovery
    ///
    /// Retry with a longer timeout, or treat the target as unhealthy
    /// and let its supervisor deal with it. A target that is merely
    /// slow still received the request; resending may duplicate work.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let reply = root
    ///     .request_reply::<Pong>(&pid, Ping, Duration::from_millis(100))
    ///     .await;
    /// assert_eq!(reply.unwrap_err(), Error::Timeout);
    /// ```
    #[error("request timed out before a reply arrived")]
    Timeout,

    /// The message was routed to the dead-letter sink instead of a live
    /// process.
    ///
    /// # Context
    ///
    /// Carries the unreachable pid. A request whose target resolves to
    /// dead letters fails with this error as soon as the sink answers
    /// with a dead-letter response, well before the request timeout.
    ///
    /// # Recovery
    ///
    /// The address is stale: drop it, or respawn the actor and use the
    /// fresh pid. Watching an address instead of polling it avoids
    /// holding stale pids in the first place.
    #[error("message for '{0}' was routed to dead letters")]
    DeadLetter(String),

    /// A reply arrived but could not be downcast to the requested type.
    ///
    /// # Context
    ///
    /// Carries the name of the requested type. The reply itself is
    /// consumed; a mismatch usually means the target answered with a
    /// different message type than the requester assumed.
    ///
    /// # Recovery
    ///
    /// Align the requested type with the responder's actual reply type,
    /// or request the raw envelope through `ResponseFuture::result` and
    /// branch on the possible types.
    #[error("reply did not match the requested type '{0}'")]
    TypeMismatch(String),

    /// Props misuse: duplicate child name, guardian strategy on a
    /// non-root spawn, or a rejected custom spawner.
    ///
    /// # Context
    ///
    /// Returned synchronously from `spawn`/`spawn_named` before any
    /// mailbox is created, so a failed spawn leaves no trace in the
    /// registry.
    ///
    /// # Recovery
    ///
    /// Pick a unique child name, or move the guardian-carrying props to
    /// a root-context spawn where guardians are legal.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// root.spawn_named(Props::from_fn(|| Worker), "solo")?;
    /// let dup = root.spawn_named(Props::from_fn(|| Worker), "solo");
    /// assert!(matches!(dup, Err(Error::InvalidSpawn(_))));
    /// ```
    #[error("invalid spawn: {0}")]
    InvalidSpawn(String),

    /// An actor's receive returned an error.
    ///
    /// # Context
    ///
    /// The usual way actor code reports a failure. The invoker catches
    /// it, suspends the mailbox and raises a failure message to the
    /// supervisor; it never unwinds through the dispatcher.
    ///
    /// # Recovery
    ///
    /// Handled by supervision, not by the sender: the parent's strategy
    /// answers with resume, restart, stop or escalate.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
    ///     let input = ctx
    ///         .message::<Job>()
    ///         .ok_or_else(|| Error::ActorFailure("unexpected message".into()))?;
    ///     self.run(input)
    /// }
    /// ```
    #[error("actor failed: {0}")]
    ActorFailure(String),

    /// A supervisor exhausted its retry budget for a child.
    ///
    /// # Context
    ///
    /// Logged by the budgeted strategies when the failure count inside
    /// their window exceeds `max_retries`; the child is stopped rather
    /// than restarted again, and its watchers receive a termination
    /// notice.
    ///
    /// # Recovery
    ///
    /// Widen the budget or window if the failures are transient, or fix
    /// the underlying fault; a child failing this persistently will
    /// exhaust any budget.
    #[error("supervision retry budget exhausted for '{0}'")]
    SupervisorEscalated(String),

    /// The operation was attempted after the system token was cancelled.
    ///
    /// # Context
    ///
    /// User-message delivery is refused once shutdown begins; in-flight
    /// reply futures bound to the system token also complete with this
    /// error. System-lane traffic keeps flowing so the tree can drain.
    ///
    /// # Recovery
    ///
    /// None during shutdown. Code racing shutdown should treat this as
    /// a signal to stop producing work.
    #[error("actor system is shutting down")]
    Shutdown,

    /// A bounded mailbox with the `Fail` overflow policy was full.
    ///
    /// # Context
    ///
    /// Carries the target pid. The rejected message is also routed to
    /// dead letters, so observability does not depend on the sender
    /// checking the result.
    ///
    /// # Recovery
    ///
    /// Back off and retry, or switch the target's mailbox to
    /// `BlockSender` if the sender can afford to wait for space.
    #[error("mailbox for '{0}' is full")]
    MailboxFull(String),

    /// A message could not be handed to its target process.
    ///
    /// # Context
    ///
    /// Infrastructure-level delivery failure, such as a malformed pid
    /// on the wire-format seam. Distinct from `DeadLetter`, which means
    /// delivery worked but the target was gone.
    ///
    /// # Recovery
    ///
    /// Inspect the carried description; these errors indicate a bug or
    /// a corrupt address rather than a transient condition.
    #[error("failed to deliver message: {0}")]
    Send(String),

    /// A receive-timeout duration must be strictly positive.
    ///
    /// # Context
    ///
    /// Returned by `set_receive_timeout` for a zero duration; the
    /// previously armed timeout, if any, is left untouched.
    ///
    /// # Recovery
    ///
    /// Pass a positive duration, or call `cancel_receive_timeout` when
    /// the intent was to disarm the timer.
    #[error("receive timeout duration must be positive")]
    InvalidTimeout,
}
