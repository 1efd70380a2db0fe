// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Middleware
//!
//! The `middleware` module provides the interceptor chains around send
//! and receive. Sender hooks transform (or swallow) an outgoing envelope
//! before delivery. Receiver middleware composes around the actor's
//! receive call; the chain is built once per spawn, and spawns without
//! middleware skip the composed path entirely.
//!

use crate::{
    actor::Actor, context::ActorContext, error::Error, pid::Pid,
};

use futures::future::BoxFuture;

use tracing::debug;

use std::sync::Arc;

/// Transforms an outgoing envelope; returning `None` swallows the send.
pub type SenderHook = Arc<
    dyn Fn(&Pid, crate::message::MessageEnvelope)
            -> Option<crate::message::MessageEnvelope>
        + Send
        + Sync,
>;

/// The receive entry point middleware wraps: the current message is on
/// the context.
pub type ReceiverFn = Arc<
    dyn for<'a> Fn(
            &'a mut dyn Actor,
            &'a mut ActorContext,
        ) -> BoxFuture<'a, Result<(), Error>>
        + Send
        + Sync,
>;

/// Wraps a receiver, returning the next link of the chain.
pub type ReceiverMiddleware = Arc<dyn Fn(ReceiverFn) -> ReceiverFn + Send + Sync>;

/// Adjusts a freshly built context before the actor starts.
pub type ContextDecorator = Arc<dyn Fn(&mut ActorContext) + Send + Sync>;

/// Runs an envelope through the sender hooks in registration order.
pub fn apply_sender_hooks(
    hooks: &[SenderHook],
    target: &Pid,
    mut envelope: crate::message::MessageEnvelope,
) -> Option<crate::message::MessageEnvelope> {
    for hook in hooks {
        match hook(target, envelope) {
            Some(next) => envelope = next,
            None => {
                debug!("Sender hook swallowed a message for {}.", target);
                return None;
            }
        }
    }
    Some(envelope)
}

/// Composes the receiver chain around the plain receive call. Returns
/// `None` when there is no middleware, so the hot path stays
/// allocation-free.
pub fn build_receiver_chain(
    middleware: &[ReceiverMiddleware],
) -> Option<ReceiverFn> {
    if middleware.is_empty() {
        return None;
    }
    let base: ReceiverFn =
        Arc::new(|actor, ctx| Box::pin(actor.receive(ctx)));
    Some(
        middleware
            .iter()
            .rev()
            .fold(base, |next, wrap| wrap(next)),
    )
}
