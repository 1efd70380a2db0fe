// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Process
//!
//! The `process` module provides the endpoint seam every address
//! resolves to. A process accepts user and system messages for exactly
//! one pid. The local variant fronts a mailbox; the dead-letter, future
//! and event-stream variants live in their own modules; remote
//! transports plug in through the registry's resolver seam.
//!

use crate::{
    error::Error,
    mailbox::{MailboxSender, PostOutcome},
    message::{MessageEnvelope, SystemMessage},
    pid::Pid,
    system::WeakSystem,
};

use async_trait::async_trait;

use tracing::debug;

use std::sync::Arc;

/// Endpoint that accepts messages for one address.
#[async_trait]
pub trait Process: Send + Sync {
    /// Delivers a user message. Errors only surface for bounded
    /// mailboxes with the `Fail` overflow policy; every other
    /// undeliverable message is re-routed to dead letters.
    async fn send_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error>;

    /// Delivers a control message.
    async fn send_system(&self, target: &Pid, message: SystemMessage);
}

/// Shared handle to a process. Cloning is a reference-count bump, which
/// keeps registry lookups allocation-free.
pub type ProcessHandle = Arc<dyn Process>;

/// Process fronting a local mailbox.
pub(crate) struct LocalProcess {
    sender: MailboxSender,
    system: WeakSystem,
}

impl LocalProcess {
    pub(crate) fn new(sender: MailboxSender, system: WeakSystem) -> Self {
        Self { sender, system }
    }

    async fn redirect(&self, target: &Pid, envelope: MessageEnvelope) {
        if let Some(system) = self.system.upgrade() {
            let _ = system
                .dead_letter_process()
                .send_user(target, envelope)
                .await;
        }
    }
}

#[async_trait]
impl Process for LocalProcess {
    async fn send_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        match self.sender.post_user(envelope).await {
            PostOutcome::Delivered => Ok(()),
            PostOutcome::Dropped(envelope) => {
                self.redirect(target, envelope).await;
                Ok(())
            }
            PostOutcome::Displaced(oldest) => {
                self.redirect(target, oldest).await;
                Ok(())
            }
            PostOutcome::Full(envelope) => {
                self.redirect(target, envelope).await;
                Err(Error::MailboxFull(target.to_string()))
            }
        }
    }

    async fn send_system(&self, target: &Pid, message: SystemMessage) {
        if let Err(message) = self.sender.post_system(message) {
            debug!(
                "System message for stopped {} handed to dead letters.",
                target
            );
            if let Some(system) = self.system.upgrade() {
                system
                    .dead_letter_process()
                    .send_system(target, message)
                    .await;
            }
        }
    }
}
