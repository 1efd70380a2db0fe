// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Dead letters
//!
//! The `dead_letter` module provides the sink process for messages whose
//! target is stopped, unknown, or unreachable. Every dead letter is
//! published on the event stream as a [`DeadLetterEvent`] (throttled to
//! a configured rate) and, when the message carried a sender, the sender
//! receives a [`DeadLetterResponse`](crate::message::DeadLetterResponse)
//! so reply futures fail fast instead of running out their timeout.
//!
//! Watching an address that resolves here answers an immediate
//! `Terminated` notice, which is what makes watch-after-stop exact.
//!

use crate::{
    error::Error,
    message::{
        DeadLetterResponse, DynMessage, MessageEnvelope, SystemMessage,
        Terminated, TerminateReason,
    },
    pid::Pid,
    process::Process,
    system::WeakSystem,
};

use async_trait::async_trait;

use parking_lot::Mutex;

use tracing::{debug, info, warn};

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Published on the event stream for every admitted dead letter.
#[derive(Clone)]
pub struct DeadLetterEvent {
    /// The unreachable target.
    pub target: Pid,
    /// The undeliverable message.
    pub message: DynMessage,
    /// The original sender, when the message was a request.
    pub sender: Option<Pid>,
}

struct ThrottleWindow {
    started: Instant,
    admitted: u64,
    suppressed: u64,
}

struct Throttle {
    limit: u64,
    interval: Duration,
    window: Mutex<ThrottleWindow>,
}

impl Throttle {
    fn new(limit: u64, interval: Duration) -> Self {
        Self {
            limit: limit.max(1),
            interval,
            window: Mutex::new(ThrottleWindow {
                started: Instant::now(),
                admitted: 0,
                suppressed: 0,
            }),
        }
    }

    /// True if the event fits the current window's budget.
    fn admit(&self) -> bool {
        let mut window = self.window.lock();
        if window.started.elapsed() >= self.interval {
            if window.suppressed > 0 {
                info!(
                    "Dead letter throttle suppressed {} events in the last window.",
                    window.suppressed
                );
            }
            window.started = Instant::now();
            window.admitted = 0;
            window.suppressed = 0;
        }
        if window.admitted < self.limit {
            window.admitted += 1;
            true
        } else {
            window.suppressed += 1;
            false
        }
    }
}

/// The sink process. It accepts anything and never fails a send.
pub(crate) struct DeadLetterProcess {
    system: WeakSystem,
    throttle: Throttle,
}

impl DeadLetterProcess {
    pub(crate) fn new(
        system: WeakSystem,
        throttle_count: u64,
        throttle_interval: Duration,
    ) -> Self {
        Self {
            system,
            throttle: Throttle::new(throttle_count, throttle_interval),
        }
    }
}

#[async_trait]
impl Process for DeadLetterProcess {
    async fn send_user(
        &self,
        target: &Pid,
        envelope: MessageEnvelope,
    ) -> Result<(), Error> {
        if self.throttle.admit() {
            warn!("Message for {} routed to dead letters.", target);
            if let Some(system) = self.system.upgrade() {
                let event: DynMessage = Arc::new(DeadLetterEvent {
                    target: target.clone(),
                    message: envelope.message().clone(),
                    sender: envelope.sender().cloned(),
                });
                system.event_stream().publish(&event);
            }
        }
        // Fail the requester fast. A dead-lettered response itself gets
        // no reply, which breaks any ping-pong between two sinks.
        if envelope.downcast_ref::<DeadLetterResponse>().is_none() {
            if let (Some(sender), Some(system)) =
                (envelope.sender(), self.system.upgrade())
            {
                let response = MessageEnvelope::new(DeadLetterResponse {
                    target: target.clone(),
                });
                let _ = system
                    .process(sender)
                    .send_user(sender, response)
                    .await;
            }
        }
        Ok(())
    }

    async fn send_system(&self, target: &Pid, message: SystemMessage) {
        match message {
            SystemMessage::Watch { watcher } => {
                // The address is gone; answer the watcher right away.
                if let Some(system) = self.system.upgrade() {
                    let notice = SystemMessage::Terminated(Terminated {
                        who: target.clone(),
                        reason: TerminateReason::Stopped,
                    });
                    system.process(&watcher).send_system(&watcher, notice).await;
                }
            }
            other => {
                debug!(
                    "Dead letters dropped system message {:?} for {}.",
                    other, target
                );
            }
        }
    }
}
