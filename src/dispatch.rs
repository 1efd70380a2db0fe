// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dispatcher
//!
//! The `dispatch` module provides the seam between mailboxes and the
//! underlying scheduler. A dispatcher takes a mailbox consumer and runs
//! it; the default dispatcher hands it to the tokio runtime, which
//! schedules actors in parallel while each mailbox keeps its own
//! dispatch single-threaded.
//!

use futures::future::BoxFuture;

use std::sync::Arc;

/// Schedules mailbox consumers.
pub trait Dispatcher: Send + Sync {
    /// Runs a consumer to completion in the background.
    fn schedule(&self, turn: BoxFuture<'static, ()>);
}

/// Dispatcher backed by `tokio::spawn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioDispatcher;

impl Dispatcher for TokioDispatcher {
    fn schedule(&self, turn: BoxFuture<'static, ()>) {
        tokio::spawn(turn);
    }
}

/// The dispatcher used when props carry none.
pub fn default_dispatcher() -> Arc<dyn Dispatcher> {
    Arc::new(TokioDispatcher)
}
