// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Supervision strategies
//!
//! This module provides the directive-based supervision framework. When
//! an actor's receive fails, the failure is raised to its parent as a
//! system message; the parent's strategy inspects the failure and the
//! child's restart statistics and answers with a directive: resume the
//! child, restart it, stop it, or escalate to its own parent.
//!
//! The runtime follows the "let it crash" philosophy: failures are
//! expected, contained per subtree, and recovered through well-defined
//! strategies rather than defensive code inside actors.
//!
//! Four strategies are provided:
//!
//! - [`OneForOneStrategy`]: the directive applies only to the failing
//!   child, with a retry budget inside a time window.
//! - [`AllForOneStrategy`]: the directive applies to all siblings.
//! - [`ExponentialBackoffStrategy`]: restarts with a jittered,
//!   exponentially growing delay, capped and reset after a stable
//!   period.
//! - [`AlwaysRestartStrategy`]: unconditional restart.
//!

use crate::{
    error::Error,
    message::Failure,
    pid::Pid,
    system::ActorSystem,
};

use async_trait::async_trait;
use rand::Rng;

use tracing::{debug, warn};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a supervisor tells the runtime to do with a failing child.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// The child keeps its state and processes the next message.
    Resume,
    /// The child instance is disposed and recreated from its producer.
    Restart,
    /// The child is terminated.
    Stop,
    /// The failure is raised to the supervisor's own parent.
    Escalate,
}

/// Maps a failure reason to a directive.
pub type Decider = Arc<dyn Fn(&Error) -> Directive + Send + Sync>;

/// How long a failure keeps influencing supervision decisions. Entries
/// older than this are evicted the next time the record is updated, so
/// a strategy window wider than the horizon is effectively clamped.
const DEFAULT_RETENTION: Duration = Duration::from_secs(600);

/// Rolling record of a child's failures.
///
/// The owning context appends a timestamp on every failure and evicts
/// entries older than the retention horizon at the same time, so
/// storage stays bounded by the horizon no matter how long the actor
/// lives. Strategies count failures inside their own (smaller) time
/// window when deciding on a directive.
///
/// # Examples
///
/// ```ignore
/// use troupe::RestartStatistics;
/// use std::time::Duration;
///
/// let mut stats = RestartStatistics::new();
/// stats.fail();
/// stats.fail();
/// assert_eq!(stats.failures_within(Duration::from_secs(10)), 2);
/// stats.reset();
/// assert_eq!(stats.failure_count(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct RestartStatistics {
    retention: Duration,
    failures: VecDeque<Instant>,
}

impl Default for RestartStatistics {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl RestartStatistics {
    /// Creates an empty record with the default retention horizon.
    ///
    /// # Returns
    ///
    /// A record holding no failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with an explicit retention horizon.
    ///
    /// # Arguments
    ///
    /// * `retention` - How long a failure stays in the record. Strategy
    ///   windows wider than this see only the retained entries.
    ///
    /// # Returns
    ///
    /// A record holding no failures.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention,
            failures: VecDeque::new(),
        }
    }

    /// Records a failure at the current instant and evicts entries that
    /// have aged out of the retention horizon.
    pub fn fail(&mut self) {
        let now = Instant::now();
        while let Some(oldest) = self.failures.front() {
            if now.duration_since(*oldest) < self.retention {
                break;
            }
            self.failures.pop_front();
        }
        self.failures.push_back(now);
    }

    /// Forgets all recorded failures.
    pub fn reset(&mut self) {
        self.failures.clear();
    }

    /// Number of failures currently retained.
    ///
    /// # Returns
    ///
    /// The count of failures younger than the retention horizon as of
    /// the last update.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Failures recorded within the trailing window.
    ///
    /// # Arguments
    ///
    /// * `window` - The trailing window to count inside. A zero window
    ///   counts every retained failure.
    ///
    /// # Returns
    ///
    /// The number of retained failures younger than `window`.
    pub fn failures_within(&self, window: Duration) -> usize {
        if window.is_zero() {
            return self.failures.len();
        }
        let now = Instant::now();
        self.failures
            .iter()
            .filter(|at| now.duration_since(**at) < window)
            .count()
    }

    /// The most recent failure, if any.
    ///
    /// # Returns
    ///
    /// The instant of the newest retained failure, or `None` for a
    /// fresh or reset record.
    pub fn last_failure(&self) -> Option<Instant> {
        self.failures.back().copied()
    }
}

/// The supervisor-side view a strategy acts through: the children under
/// supervision and the path up the tree.
#[async_trait]
pub trait Supervisor: Send {
    /// Snapshot of the supervised children.
    ///
    /// # Returns
    ///
    /// The pids of every live child at the moment the failure is being
    /// handled. All-for-one strategies direct each of them.
    fn children(&self) -> Vec<Pid>;

    /// Raises the failure to this supervisor's own parent.
    ///
    /// # Arguments
    ///
    /// * `failure` - The failure being escalated. The implementation
    ///   re-attributes it to the supervisor itself before passing it
    ///   up, so the grandparent directs the supervisor, not the
    ///   original child.
    async fn escalate(&mut self, failure: Failure);
}

/// Selects and applies a directive for a child failure.
///
/// Implementations act through the system's directive helpers
/// (`resume`, `restart`, `stop`) or through the supervisor view for
/// escalation. A strategy instance may supervise any number of
/// children; per-child state lives in the [`RestartStatistics`] carried
/// inside each failure.
///
/// # Examples
///
/// ```ignore
/// use troupe::{OneForOneStrategy, Props};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let props = Props::from_fn(|| Worker::default()).with_supervisor(
///     Arc::new(OneForOneStrategy::with_retries(3, Duration::from_secs(1))),
/// );
/// ```
#[async_trait]
pub trait SupervisorStrategy: Send + Sync {
    /// Handles one failure raised by a supervised child.
    ///
    /// # Arguments
    ///
    /// * `system` - The owning system, used to direct children.
    /// * `supervisor` - The supervising side: child snapshot and the
    ///   escalation path.
    /// * `failure` - Who failed, why, and the child's restart record.
    async fn handle_failure(
        &self,
        system: &ActorSystem,
        supervisor: &mut dyn Supervisor,
        failure: Failure,
    );
}

/// Applies the decider's directive to the failing child only.
///
/// Restarts are budgeted: more than `max_retries` failures inside
/// `within` stops the child instead.
pub struct OneForOneStrategy {
    max_retries: usize,
    within: Duration,
    decider: Decider,
}

impl OneForOneStrategy {
    /// Creates a strategy with the given retry budget and decider.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Restarts tolerated inside the window before
    ///   the child is stopped instead.
    /// * `within` - The trailing window the budget applies to.
    /// * `decider` - Maps each failure reason to a directive.
    ///
    /// # Returns
    ///
    /// A strategy ready to attach to props through `with_supervisor`.
    pub fn new(max_retries: usize, within: Duration, decider: Decider) -> Self {
        Self {
            max_retries,
            within,
            decider,
        }
    }

    /// Retry budget with the default restart decider.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Restarts tolerated inside the window.
    /// * `within` - The trailing window the budget applies to.
    pub fn with_retries(max_retries: usize, within: Duration) -> Self {
        Self::new(max_retries, within, default_decider())
    }
}

#[async_trait]
impl SupervisorStrategy for OneForOneStrategy {
    async fn handle_failure(
        &self,
        system: &ActorSystem,
        supervisor: &mut dyn Supervisor,
        failure: Failure,
    ) {
        let directive = (self.decider)(&failure.reason);
        debug!(
            "Supervising {}: {:?} after {:?}.",
            failure.who, directive, failure.reason
        );
        match directive {
            Directive::Resume => system.resume(&failure.who).await,
            Directive::Restart => {
                if failure.stats.failures_within(self.within) > self.max_retries
                {
                    let exhausted =
                        Error::SupervisorEscalated(failure.who.to_string());
                    warn!("{}; stopping the child.", exhausted);
                    system.stop(&failure.who).await;
                } else {
                    system.restart(&failure.who).await;
                }
            }
            Directive::Stop => system.stop(&failure.who).await,
            Directive::Escalate => supervisor.escalate(failure).await,
        }
    }
}

/// Applies the decider's directive to every supervised child, not just
/// the failing one.
pub struct AllForOneStrategy {
    max_retries: usize,
    within: Duration,
    decider: Decider,
}

impl AllForOneStrategy {
    /// Creates a strategy with the given retry budget and decider.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Restarts tolerated inside the window before
    ///   every supervised child is stopped instead.
    /// * `within` - The trailing window the budget applies to.
    /// * `decider` - Maps each failure reason to a directive, applied
    ///   to the failing child and all of its siblings.
    pub fn new(max_retries: usize, within: Duration, decider: Decider) -> Self {
        Self {
            max_retries,
            within,
            decider,
        }
    }
}

#[async_trait]
impl SupervisorStrategy for AllForOneStrategy {
    async fn handle_failure(
        &self,
        system: &ActorSystem,
        supervisor: &mut dyn Supervisor,
        failure: Failure,
    ) {
        let directive = (self.decider)(&failure.reason);
        let mut targets = supervisor.children();
        if !targets.contains(&failure.who) {
            targets.push(failure.who.clone());
        }
        debug!(
            "Supervising {} siblings of {}: {:?}.",
            targets.len(),
            failure.who,
            directive
        );
        match directive {
            Directive::Resume => {
                for pid in &targets {
                    system.resume(pid).await;
                }
            }
            Directive::Restart => {
                if failure.stats.failures_within(self.within) > self.max_retries
                {
                    let exhausted =
                        Error::SupervisorEscalated(failure.who.to_string());
                    warn!(
                        "{}; stopping all {} children.",
                        exhausted,
                        targets.len()
                    );
                    for pid in &targets {
                        system.stop(pid).await;
                    }
                } else {
                    for pid in &targets {
                        system.restart(pid).await;
                    }
                }
            }
            Directive::Stop => {
                for pid in &targets {
                    system.stop(pid).await;
                }
            }
            Directive::Escalate => supervisor.escalate(failure).await,
        }
    }
}

/// Restarts the failing child after a jittered exponential delay.
///
/// The delay doubles with every failure inside the reset window and is
/// capped at `max_backoff`. Once the child has been stable for longer
/// than the reset window the progression starts over.
pub struct ExponentialBackoffStrategy {
    min_backoff: Duration,
    max_backoff: Duration,
    reset_window: Duration,
}

impl ExponentialBackoffStrategy {
    /// Creates a backoff strategy.
    ///
    /// # Arguments
    ///
    /// * `min_backoff` - Delay before the first restart; doubles with
    ///   every further failure inside the reset window.
    /// * `max_backoff` - Upper bound on the delay, jitter included.
    /// * `reset_window` - A child stable for longer than this starts
    ///   the progression over from `min_backoff`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use troupe::ExponentialBackoffStrategy;
    /// use std::time::Duration;
    ///
    /// // 100ms, 200ms, 400ms, ... capped at 30s.
    /// let strategy = ExponentialBackoffStrategy::new(
    ///     Duration::from_millis(100),
    ///     Duration::from_secs(30),
    ///     Duration::from_secs(60),
    /// );
    /// ```
    pub fn new(
        min_backoff: Duration,
        max_backoff: Duration,
        reset_window: Duration,
    ) -> Self {
        Self {
            min_backoff,
            max_backoff,
            reset_window,
        }
    }

    fn delay_for(&self, recent_failures: usize) -> Duration {
        let exponent = recent_failures.saturating_sub(1).min(32) as u32;
        let base = self
            .min_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);
        let jitter_ms = base.as_millis() as u64 / 10;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        (base + jitter).min(self.max_backoff)
    }
}

impl Default for ExponentialBackoffStrategy {
    fn default() -> Self {
        Self::new(
            Duration::from_millis(100),
            Duration::from_secs(30),
            Duration::from_secs(60),
        )
    }
}

#[async_trait]
impl SupervisorStrategy for ExponentialBackoffStrategy {
    async fn handle_failure(
        &self,
        system: &ActorSystem,
        _supervisor: &mut dyn Supervisor,
        failure: Failure,
    ) {
        let recent = failure.stats.failures_within(self.reset_window);
        let delay = self.delay_for(recent);
        debug!(
            "Restarting {} in {:?} ({} recent failures).",
            failure.who, delay, recent
        );
        let system = system.clone();
        let who = failure.who;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            system.restart(&who).await;
        });
    }
}

/// Restarts the failing child unconditionally, with no retry budget.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRestartStrategy;

#[async_trait]
impl SupervisorStrategy for AlwaysRestartStrategy {
    async fn handle_failure(
        &self,
        system: &ActorSystem,
        _supervisor: &mut dyn Supervisor,
        failure: Failure,
    ) {
        debug!("Restarting {} unconditionally.", failure.who);
        system.restart(&failure.who).await;
    }
}

/// The decider used when none is configured: restart on any failure.
///
/// # Returns
///
/// A decider answering [`Directive::Restart`] for every reason.
pub fn default_decider() -> Decider {
    Arc::new(|_reason| Directive::Restart)
}

/// The strategy used when props carry none: one-for-one, ten retries in
/// ten seconds, restart decider.
///
/// # Returns
///
/// The shared default strategy. The root guardian also uses it unless
/// the system configuration replaces it.
pub fn default_strategy() -> Arc<dyn SupervisorStrategy> {
    Arc::new(OneForOneStrategy::with_retries(10, Duration::from_secs(10)))
}
