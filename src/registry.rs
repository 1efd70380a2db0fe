// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Process registry
//!
//! The `registry` module maps hierarchical ids to live processes. The
//! map is sharded (`DashMap`) because `get` sits on the send hot path
//! and must scale with concurrent senders; a lookup clones an `Arc`
//! handle and never allocates.
//!
//! Lookups for an address whose system field is not local go through
//! the remote-resolver seam; without a resolver, and for any id with no
//! live process, the dead-letter process is returned so sends always
//! have somewhere to go.
//!

use crate::{
    pid::Pid,
    process::ProcessHandle,
};

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::RwLock;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Resolves non-local addresses to transport-backed processes.
pub trait RemoteResolver: Send + Sync {
    /// Returns the process for a pid hosted on another system, if the
    /// transport knows it.
    fn resolve(&self, pid: &Pid) -> Option<ProcessHandle>;
}

/// Sharded id → process map plus the monotonic id allocator.
pub struct ProcessRegistry {
    address: String,
    sequence: AtomicU64,
    processes: DashMap<String, ProcessHandle>,
    dead_letter: OnceLock<ProcessHandle>,
    remote_resolver: RwLock<Option<Arc<dyn RemoteResolver>>>,
}

impl ProcessRegistry {
    pub(crate) fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            sequence: AtomicU64::new(1),
            processes: DashMap::new(),
            dead_letter: OnceLock::new(),
            remote_resolver: RwLock::new(None),
        }
    }

    pub(crate) fn install_dead_letter(&self, handle: ProcessHandle) {
        let _ = self.dead_letter.set(handle);
    }

    fn dead_letter(&self) -> ProcessHandle {
        self.dead_letter
            .get()
            .expect("dead letter process is installed at system construction")
            .clone()
    }

    /// The local system address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Allocates the next value of the process-local sequence.
    ///
    /// # Returns
    ///
    /// A monotonically increasing value, unique within this registry
    /// only. Generated actor and future names are built from it.
    pub fn next_id(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a process under an id.
    ///
    /// # Arguments
    ///
    /// * `id` - The hierarchical id to claim.
    /// * `process` - The endpoint future sends will resolve to.
    ///
    /// # Returns
    ///
    /// `true` when the id was free and is now claimed; `false` when a
    /// live process already holds it, in which case the caller reports
    /// an invalid spawn.
    pub fn try_add(&self, id: &str, process: ProcessHandle) -> bool {
        match self.processes.entry(id.to_owned()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(process);
                true
            }
        }
    }

    /// Resolves a pid to a process. Non-local addresses go through the
    /// remote resolver; anything unresolved lands on dead letters.
    ///
    /// # Arguments
    ///
    /// * `pid` - The address to resolve.
    ///
    /// # Returns
    ///
    /// A handle that accepts sends. This sits on the send hot path:
    /// the lookup clones an `Arc` and never allocates.
    pub fn get(&self, pid: &Pid) -> ProcessHandle {
        if pid.address() != self.address {
            let resolved = self
                .remote_resolver
                .read()
                .as_ref()
                .and_then(|resolver| resolver.resolve(pid));
            return resolved.unwrap_or_else(|| self.dead_letter());
        }
        match self.processes.get(pid.id()) {
            Some(process) => process.value().clone(),
            None => self.dead_letter(),
        }
    }

    /// Looks up a local process without the dead-letter fallback.
    pub fn get_local(&self, id: &str) -> Option<ProcessHandle> {
        self.processes.get(id).map(|process| process.value().clone())
    }

    /// Removes a process. Sends racing with removal resolve to dead
    /// letters.
    pub fn remove(&self, pid: &Pid) {
        self.processes.remove(pid.id());
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// True when no process is registered.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Installs the transport hook for non-local addresses.
    pub fn set_remote_resolver(&self, resolver: Arc<dyn RemoteResolver>) {
        *self.remote_resolver.write() = Some(resolver);
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::error::Error;
    use crate::message::{MessageEnvelope, SystemMessage};
    use crate::process::Process;

    use async_trait::async_trait;

    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingProcess {
        user: AtomicUsize,
    }

    #[async_trait]
    impl Process for CountingProcess {
        async fn send_user(
            &self,
            _target: &Pid,
            _envelope: MessageEnvelope,
        ) -> Result<(), Error> {
            self.user.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_system(&self, _target: &Pid, _message: SystemMessage) {}
    }

    fn registry() -> ProcessRegistry {
        let registry = ProcessRegistry::new("local");
        registry.install_dead_letter(Arc::new(CountingProcess::default()));
        registry
    }

    #[test]
    fn test_next_id_is_monotonic() {
        let registry = registry();
        let first = registry.next_id();
        let second = registry.next_id();
        assert!(second > first);
    }

    #[test]
    fn test_try_add_rejects_duplicates() {
        let registry = registry();
        let process: ProcessHandle = Arc::new(CountingProcess::default());
        assert!(registry.try_add("root/a", process.clone()));
        assert!(!registry.try_add("root/a", process));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_falls_back_to_dead_letter() {
        let registry = registry();
        let missing = Pid::new("local", "root/ghost");
        let handle = registry.get(&missing);
        handle
            .send_user(&missing, MessageEnvelope::new(1u32))
            .await
            .unwrap();
        // The fallback is the installed dead-letter process.
        assert!(registry.get_local("root/ghost").is_none());
    }

    #[test]
    fn test_foreign_address_without_resolver() {
        let registry = registry();
        let process: ProcessHandle = Arc::new(CountingProcess::default());
        assert!(registry.try_add("root/a", process));
        // Same id, different system address: must not resolve locally.
        let foreign = Pid::new("other:9000", "root/a");
        let resolved = registry.get(&foreign);
        assert!(!Arc::ptr_eq(
            &resolved,
            &registry.get_local("root/a").unwrap()
        ));
    }

    #[test]
    fn test_remove() {
        let registry = registry();
        let process: ProcessHandle = Arc::new(CountingProcess::default());
        registry.try_add("root/a", process);
        registry.remove(&Pid::new("local", "root/a"));
        assert!(registry.is_empty());
    }
}
