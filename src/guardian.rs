// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Guardians
//!
//! The `guardian` module provides the context-less parents of top-level
//! actors. The root guardian supervises everything spawned from outside
//! any actor; spawning with a custom guardian strategy attaches the
//! actor under a cached guardian bound to that strategy instead.
//!
//! Guardians are processes, not actors: they have no mailbox and handle
//! failure and termination notices inline.
//!

use crate::{
    error::Error,
    message::{Failure, MessageEnvelope, SystemMessage},
    pid::Pid,
    process::{Process, ProcessHandle},
    supervision::{Supervisor, SupervisorStrategy},
    system::{ActorSystem, WeakSystem},
};

use async_trait::async_trait;

use parking_lot::Mutex;

use tracing::{debug, error};

use std::sync::Arc;

/// A context-less parent bound to one supervisor strategy.
pub(crate) struct GuardianProcess {
    pid: Pid,
    system: WeakSystem,
    strategy: Arc<dyn SupervisorStrategy>,
    children: Mutex<Vec<Pid>>,
}

impl GuardianProcess {
    pub(crate) fn new(
        pid: Pid,
        system: WeakSystem,
        strategy: Arc<dyn SupervisorStrategy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pid,
            system,
            strategy,
            children: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn pid(&self) -> &Pid {
        &self.pid
    }

    pub(crate) fn register_child(&self, child: Pid) {
        self.children.lock().push(child);
    }

    pub(crate) fn children(&self) -> Vec<Pid> {
        self.children.lock().clone()
    }
}

/// Supervisor view a guardian hands to its strategy: escalation has
/// nowhere to go, so it stops the offender.
struct GuardianSupervisor {
    children: Vec<Pid>,
    system: ActorSystem,
}

#[async_trait]
impl Supervisor for GuardianSupervisor {
    fn children(&self) -> Vec<Pid> {
        self.children.clone()
    }

    async fn escalate(&mut self, failure: Failure) {
        error!(
            "Failure of {} escalated past the root ({}); stopping it.",
            failure.who, failure.reason
        );
        self.system.stop(&failure.who).await;
    }
}

#[async_trait]
impl Process for GuardianProcess {
    async fn send_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        // Guardians take no user traffic.
        if let Some(system) = self.system.upgrade() {
            let _ = system
                .dead_letter_process()
                .send_user(target, envelope)
                .await;
        }
        Ok(())
    }

    async fn send_system(&self, _target: &Pid, message: SystemMessage) {
        match message {
            SystemMessage::Failure(failure) => {
                let Some(system) = self.system.upgrade() else {
                    return;
                };
                debug!(
                    "Guardian {} supervising failure of {}.",
                    self.pid, failure.who
                );
                let mut supervisor = GuardianSupervisor {
                    children: self.children(),
                    system: system.clone(),
                };
                self.strategy
                    .handle_failure(&system, &mut supervisor, *failure)
                    .await;
            }
            SystemMessage::Terminated(terminated) => {
                self.children.lock().retain(|child| child != &terminated.who);
            }
            other => {
                debug!(
                    "Guardian {} dropped system message {:?}.",
                    self.pid, other
                );
            }
        }
    }
}

/// Cache of guardians keyed by strategy identity.
pub(crate) struct Guardians {
    entries: Mutex<Vec<(usize, Arc<GuardianProcess>)>>,
}

impl Guardians {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the guardian bound to this strategy instance, creating
    /// and registering it on first use.
    pub(crate) fn guardian_for(
        &self,
        system: &ActorSystem,
        strategy: &Arc<dyn SupervisorStrategy>,
    ) -> Arc<GuardianProcess> {
        let key = Arc::as_ptr(strategy) as *const () as usize;
        let mut entries = self.entries.lock();
        if let Some((_, guardian)) =
            entries.iter().find(|(entry, _)| *entry == key)
        {
            return guardian.clone();
        }
        let id = format!("guardian-{}", system.registry().next_id());
        let pid = Pid::new(system.address(), id);
        let guardian = GuardianProcess::new(
            pid.clone(),
            system.downgrade(),
            strategy.clone(),
        );
        system
            .registry()
            .try_add(pid.id(), guardian.clone() as ProcessHandle);
        debug!("Created guardian {} for a custom strategy.", pid);
        entries.push((key, guardian.clone()));
        guardian
    }

    /// All custom guardians created so far.
    pub(crate) fn all(&self) -> Vec<Arc<GuardianProcess>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, guardian)| guardian.clone())
            .collect()
    }
}
