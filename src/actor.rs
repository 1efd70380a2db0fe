// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait, the single seam actor
//! code implements. An actor receives every message through `receive`,
//! lifecycle notifications and user traffic alike, downcasting the
//! current message from its context:
//!
//! ```ignore
//! #[async_trait]
//! impl Actor for Greeter {
//!     async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
//!         if let Some(name) = ctx.message::<Greet>() {
//!             ctx.respond(Greeting(format!("hello {}", name.0))).await;
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Returning an error raises a failure to the supervisor; the actor
//! never observes its own failure handling. An actor instance is dropped
//! after `Stopped` is delivered, and on restart the old instance is
//! dropped before the producer builds its replacement, so cleanup
//! belongs in `Drop`.
//!

use crate::{context::ActorContext, error::Error};

use async_trait::async_trait;

use std::any::Any;
use std::sync::Arc;

/// A unit of concurrent computation with private state.
#[async_trait]
pub trait Actor: Any + Send + 'static {
    /// Handles the current message of the context.
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error>;
}

impl dyn Actor {
    /// Downcasts to a concrete actor type. Used inside continuations,
    /// where the actor arrives type-erased.
    pub fn downcast_mut<A: Actor>(&mut self) -> Option<&mut A> {
        (self as &mut dyn Any).downcast_mut::<A>()
    }
}

/// Builds a fresh actor instance at spawn time and on every restart.
pub type Producer = Arc<dyn Fn() -> Box<dyn Actor> + Send + Sync>;
