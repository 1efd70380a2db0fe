// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runtime
//!
//! This crate provides a message-passing actor runtime. It is based on
//! the [actor model](https://en.wikipedia.org/wiki/Actor_model) as
//! described by Carl Hewitt in 1973. In response to a message that it
//! receives, an actor can:
//!
//! - make local decisions
//! - update its private state
//! - create more actors
//! - send more messages
//! - determine how to respond to the next message received
//!
//! Actors are addressed through [`Pid`] handles and never share state;
//! each actor's mailbox guarantees single-threaded dispatch, so actor
//! state needs no locking. Parents supervise their children through
//! directive-based strategies, termination is observable through the
//! watch protocol, and undeliverable messages land in a dead-letter
//! sink rather than disappearing.
//!
//! Remote transports, cluster membership and persistence are external
//! collaborators: they plug in through the [`Process`] seam and the
//! registry's remote resolver without the kernel knowing about networks
//! or storage.
//!

mod actor;
mod config;
mod context;
mod dead_letter;
mod dispatch;
mod error;
mod event_stream;
mod future;
mod guardian;
mod mailbox;
mod message;
mod middleware;
mod pid;
mod process;
mod props;
mod registry;
mod root;
mod supervision;
mod system;

pub use actor::{Actor, Producer};
pub use config::SystemConfig;
pub use context::{ActorContext, ActorLifecycle};
pub use dead_letter::DeadLetterEvent;
pub use dispatch::{default_dispatcher, Dispatcher, TokioDispatcher};
pub use error::Error;
pub use event_stream::{EventStream, SubscriptionId};
pub use future::ResponseFuture;
pub use mailbox::{
    mailbox, Mailbox, MailboxControl, MailboxKind, MailboxSender,
    MessageInvoker, OverflowPolicy, PostOutcome,
};
pub use message::{
    Continuation, ContinuationFn, DeadLetterResponse, DynMessage, Failure,
    MessageEnvelope, PoisonPill, ReceiveTimeout, Restarting, Started,
    Stopped, Stopping, SystemMessage, Terminated, TerminateReason,
};
pub use middleware::{
    ContextDecorator, ReceiverFn, ReceiverMiddleware, SenderHook,
};
pub use pid::Pid;
pub use process::{Process, ProcessHandle};
pub use props::{Props, Spawner};
pub use registry::{ProcessRegistry, RemoteResolver};
pub use root::RootContext;
pub use supervision::{
    default_decider, default_strategy, AllForOneStrategy,
    AlwaysRestartStrategy, Decider, Directive, ExponentialBackoffStrategy,
    OneForOneStrategy, RestartStatistics, Supervisor, SupervisorStrategy,
};
pub use system::ActorSystem;
