// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! The `mailbox` module provides the per-actor queue pair: an unbounded
//! system lane and a user lane that is unbounded by default or bounded
//! with a configurable overflow policy. A single consumer task drains
//! the mailbox, which is what makes actor state safe without locks.
//!
//! Invariants upheld here:
//!
//! - at most one consumer runs per mailbox; the invoker is owned by the
//!   consumer task and never shared,
//! - pending system messages are fully drained before user dispatch
//!   resumes,
//! - while suspended, only system messages are dispatched,
//! - a turn processes at most `throughput` user messages before yielding
//!   to the scheduler.
//!

use crate::message::{MessageEnvelope, SystemMessage};

use async_trait::async_trait;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, Semaphore};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// User-lane shape, configured per spawn through props.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MailboxKind {
    /// Unbounded user lane; flow control is left to the application.
    #[default]
    Unbounded,
    /// Bounded user lane with an overflow policy.
    Bounded {
        capacity: usize,
        policy: OverflowPolicy,
    },
}

/// What a bounded user lane does when full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// The sender waits for space.
    BlockSender,
    /// The new message is dropped (dead-lettered).
    DropNewest,
    /// The oldest queued message is dropped (dead-lettered) to make
    /// room.
    DropOldest,
    /// The send fails with a mailbox-full error.
    Fail,
}

/// Result of posting to the user lane.
#[derive(Debug)]
pub enum PostOutcome {
    /// Queued for dispatch.
    Delivered,
    /// The message was not queued (closed mailbox or `DropNewest`).
    Dropped(MessageEnvelope),
    /// The message was queued but displaced the returned older one
    /// (`DropOldest`).
    Displaced(MessageEnvelope),
    /// The lane was full under the `Fail` policy.
    Full(MessageEnvelope),
}

struct UserQueue {
    entries: Mutex<VecDeque<MessageEnvelope>>,
    notify: Notify,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    space: Option<Semaphore>,
    closed: AtomicBool,
}

impl UserQueue {
    fn new(kind: &MailboxKind) -> Self {
        let (capacity, policy) = match kind {
            MailboxKind::Unbounded => (None, OverflowPolicy::DropNewest),
            MailboxKind::Bounded { capacity, policy } => {
                (Some((*capacity).max(1)), *policy)
            }
        };
        let space = match (capacity, policy) {
            (Some(capacity), OverflowPolicy::BlockSender) => {
                Some(Semaphore::new(capacity))
            }
            _ => None,
        };
        Self {
            entries: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            policy,
            space,
            closed: AtomicBool::new(false),
        }
    }

    async fn push(&self, envelope: MessageEnvelope) -> PostOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PostOutcome::Dropped(envelope);
        }
        if let Some(space) = &self.space {
            // Waiters are served in FIFO order, preserving per-sender
            // ordering under back-pressure.
            match space.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return PostOutcome::Dropped(envelope),
            }
        }
        let outcome = {
            let mut entries = self.entries.lock();
            if self.closed.load(Ordering::Acquire) {
                PostOutcome::Dropped(envelope)
            } else if let Some(capacity) = self.capacity {
                if entries.len() >= capacity && self.space.is_none() {
                    match self.policy {
                        OverflowPolicy::DropNewest => {
                            PostOutcome::Dropped(envelope)
                        }
                        OverflowPolicy::DropOldest => {
                            let oldest = entries.pop_front();
                            entries.push_back(envelope);
                            match oldest {
                                Some(oldest) => PostOutcome::Displaced(oldest),
                                None => PostOutcome::Delivered,
                            }
                        }
                        OverflowPolicy::Fail => PostOutcome::Full(envelope),
                        OverflowPolicy::BlockSender => {
                            // Space is governed by the semaphore above.
                            entries.push_back(envelope);
                            PostOutcome::Delivered
                        }
                    }
                } else {
                    entries.push_back(envelope);
                    PostOutcome::Delivered
                }
            } else {
                entries.push_back(envelope);
                PostOutcome::Delivered
            }
        };
        if matches!(outcome, PostOutcome::Delivered | PostOutcome::Displaced(_))
        {
            self.notify.notify_one();
        }
        outcome
    }

    fn pop(&self) -> Option<MessageEnvelope> {
        let envelope = self.entries.lock().pop_front();
        if envelope.is_some() {
            if let Some(space) = &self.space {
                space.add_permits(1);
            }
        }
        envelope
    }

    fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if !self.is_empty() || self.closed.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(space) = &self.space {
            space.close();
        }
        self.notify.notify_waiters();
    }
}

/// Producer half of a mailbox, held by the local process.
#[derive(Clone)]
pub struct MailboxSender {
    queue: Arc<UserQueue>,
    system_tx: mpsc::UnboundedSender<SystemMessage>,
}

impl MailboxSender {
    /// Posts to the user lane.
    ///
    /// # Arguments
    ///
    /// * `envelope` - The message to queue. Under the `BlockSender`
    ///   policy this waits for space.
    ///
    /// # Returns
    ///
    /// A [`PostOutcome`] describing whether the envelope was queued,
    /// dropped, displaced an older one, or found the lane full. The
    /// local process routes every non-delivered envelope to dead
    /// letters.
    pub async fn post_user(&self, envelope: MessageEnvelope) -> PostOutcome {
        self.queue.push(envelope).await
    }

    /// Posts to the system lane.
    ///
    /// # Errors
    ///
    /// Returns the message back when the consumer is gone, so the
    /// caller can re-route it (watch requests, for instance, still
    /// deserve an answer from the dead-letter sink).
    pub fn post_system(
        &self,
        message: SystemMessage,
    ) -> Result<(), SystemMessage> {
        self.system_tx.send(message).map_err(|err| err.0)
    }
}

/// Consumer half of a mailbox. [`Mailbox::run`] is scheduled once on a
/// dispatcher and owns the invoker for the life of the actor.
pub struct Mailbox {
    queue: Arc<UserQueue>,
    system_rx: mpsc::UnboundedReceiver<SystemMessage>,
    throughput: usize,
}

/// What the invoker tells the mailbox after dispatching a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxControl {
    /// Keep dispatching.
    Continue,
    /// Pause user dispatch until a resume arrives.
    Suspend,
    /// Resume user dispatch.
    Resume,
    /// The process is finished; drain and exit.
    Terminate,
}

/// Dispatch target fed by a mailbox consumer. Implemented by the actor
/// cell; the mailbox guarantees the calls never overlap.
#[async_trait]
pub trait MessageInvoker: Send {
    /// Dispatches one system message.
    async fn invoke_system(&mut self, message: SystemMessage)
        -> MailboxControl;

    /// Dispatches one user message.
    async fn invoke_user(&mut self, envelope: MessageEnvelope)
        -> MailboxControl;

    /// Routes a message that will never be dispatched to dead letters.
    async fn dead_letter(&mut self, envelope: MessageEnvelope);
}

enum Step {
    Continue,
    Terminated,
}

/// Creates a connected mailbox pair.
///
/// # Arguments
///
/// * `kind` - The user-lane shape; the system lane is always unbounded.
/// * `throughput` - User messages dispatched per turn before the
///   consumer yields its worker; clamped to at least one.
///
/// # Returns
///
/// The producer half for the local process and the consumer half whose
/// [`Mailbox::run`] is handed to a dispatcher exactly once.
pub fn mailbox(kind: &MailboxKind, throughput: usize) -> (MailboxSender, Mailbox) {
    let queue = Arc::new(UserQueue::new(kind));
    let (system_tx, system_rx) = mpsc::unbounded_channel();
    let sender = MailboxSender {
        queue: queue.clone(),
        system_tx,
    };
    let mailbox = Mailbox {
        queue,
        system_rx,
        throughput: throughput.max(1),
    };
    (sender, mailbox)
}

impl Mailbox {
    fn apply(control: MailboxControl, suspended: &mut bool) -> Step {
        match control {
            MailboxControl::Continue => Step::Continue,
            MailboxControl::Suspend => {
                *suspended = true;
                Step::Continue
            }
            MailboxControl::Resume => {
                *suspended = false;
                Step::Continue
            }
            MailboxControl::Terminate => Step::Terminated,
        }
    }

    /// Runs the consumer until the invoker terminates. Undispatched user
    /// messages are handed back for dead-lettering.
    pub async fn run(mut self, mut invoker: Box<dyn MessageInvoker>) {
        let mut suspended = false;
        'main: loop {
            // The system lane drains completely before user traffic.
            while let Ok(message) = self.system_rx.try_recv() {
                if let Step::Terminated =
                    Self::apply(invoker.invoke_system(message).await, &mut suspended)
                {
                    break 'main;
                }
            }
            if !suspended {
                let mut budget = self.throughput;
                loop {
                    if budget == 0 {
                        // Yield the worker between turns so one busy
                        // actor cannot starve its siblings.
                        tokio::task::yield_now().await;
                        continue 'main;
                    }
                    if !self.system_rx.is_empty() {
                        continue 'main;
                    }
                    let Some(envelope) = self.queue.pop() else {
                        break;
                    };
                    budget -= 1;
                    if let Step::Terminated = Self::apply(
                        invoker.invoke_user(envelope).await,
                        &mut suspended,
                    ) {
                        break 'main;
                    }
                    if suspended {
                        continue 'main;
                    }
                }
            }
            if suspended {
                match self.system_rx.recv().await {
                    Some(message) => {
                        if let Step::Terminated = Self::apply(
                            invoker.invoke_system(message).await,
                            &mut suspended,
                        ) {
                            break 'main;
                        }
                    }
                    None => break 'main,
                }
            } else {
                tokio::select! {
                    biased;
                    message = self.system_rx.recv() => match message {
                        Some(message) => {
                            if let Step::Terminated = Self::apply(
                                invoker.invoke_system(message).await,
                                &mut suspended,
                            ) {
                                break 'main;
                            }
                        }
                        None => break 'main,
                    },
                    _ = self.queue.wait() => {}
                }
            }
        }
        self.system_rx.close();
        self.queue.close();
        while let Some(envelope) = self.queue.pop() {
            invoker.dead_letter(envelope).await;
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::MessageEnvelope;

    fn envelope(tag: u32) -> MessageEnvelope {
        MessageEnvelope::new(tag)
    }

    fn tag(envelope: &MessageEnvelope) -> u32 {
        *envelope.downcast_ref::<u32>().unwrap()
    }

    #[tokio::test]
    async fn test_unbounded_fifo() {
        let (sender, mailbox) = mailbox(&MailboxKind::Unbounded, 300);
        for i in 0..5u32 {
            assert!(matches!(
                sender.post_user(envelope(i)).await,
                PostOutcome::Delivered
            ));
        }
        for i in 0..5u32 {
            assert_eq!(tag(&mailbox.queue.pop().unwrap()), i);
        }
        assert!(mailbox.queue.pop().is_none());
    }

    #[tokio::test]
    async fn test_drop_newest_when_full() {
        let kind = MailboxKind::Bounded {
            capacity: 2,
            policy: OverflowPolicy::DropNewest,
        };
        let (sender, _mailbox) = mailbox(&kind, 300);
        sender.post_user(envelope(1)).await;
        sender.post_user(envelope(2)).await;
        match sender.post_user(envelope(3)).await {
            PostOutcome::Dropped(rejected) => assert_eq!(tag(&rejected), 3),
            other => panic!("expected Dropped, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_oldest_when_full() {
        let kind = MailboxKind::Bounded {
            capacity: 2,
            policy: OverflowPolicy::DropOldest,
        };
        let (sender, mailbox) = mailbox(&kind, 300);
        sender.post_user(envelope(1)).await;
        sender.post_user(envelope(2)).await;
        match sender.post_user(envelope(3)).await {
            PostOutcome::Displaced(displaced) => assert_eq!(tag(&displaced), 1),
            other => panic!("expected Displaced, got {:?}", other),
        }
        assert_eq!(tag(&mailbox.queue.pop().unwrap()), 2);
        assert_eq!(tag(&mailbox.queue.pop().unwrap()), 3);
    }

    #[tokio::test]
    async fn test_fail_when_full() {
        let kind = MailboxKind::Bounded {
            capacity: 1,
            policy: OverflowPolicy::Fail,
        };
        let (sender, _mailbox) = mailbox(&kind, 300);
        sender.post_user(envelope(1)).await;
        assert!(matches!(
            sender.post_user(envelope(2)).await,
            PostOutcome::Full(_)
        ));
    }

    #[tokio::test]
    async fn test_block_sender_waits_for_space() {
        let kind = MailboxKind::Bounded {
            capacity: 1,
            policy: OverflowPolicy::BlockSender,
        };
        let (sender, mailbox) = mailbox(&kind, 300);
        sender.post_user(envelope(1)).await;

        let blocked = tokio::spawn({
            let sender = sender.clone();
            async move { sender.post_user(envelope(2)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        assert_eq!(tag(&mailbox.queue.pop().unwrap()), 1);
        assert!(matches!(blocked.await.unwrap(), PostOutcome::Delivered));
        assert_eq!(tag(&mailbox.queue.pop().unwrap()), 2);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects() {
        let (sender, mailbox) = mailbox(&MailboxKind::Unbounded, 300);
        mailbox.queue.close();
        assert!(matches!(
            sender.post_user(envelope(1)).await,
            PostOutcome::Dropped(_)
        ));
    }
}
