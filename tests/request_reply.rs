// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Request/reply, futures, middleware and spawn validation tests.

use troupe::{
    Actor, ActorContext, ActorSystem, AlwaysRestartStrategy, Error,
    MailboxKind, OverflowPolicy, Pid, Props, ReceiverFn, ReceiverMiddleware,
    SenderHook, Started, SupervisorStrategy, TerminateReason,
};

use async_trait::async_trait;
use futures::future::BoxFuture;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ping(String);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Pong(String);

struct Echo;

#[async_trait]
impl Actor for Echo {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if let Some(ping) = ctx.message::<Ping>() {
            let reply = Pong(ping.0.clone());
            ctx.respond(reply).await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_request_reply_round_trip() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Echo)).unwrap();
    let reply = system
        .root()
        .request_reply::<Pong>(&pid, Ping("x".to_owned()), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(*reply, Pong("x".to_owned()));
}

#[tokio::test]
async fn test_request_to_unknown_address_fails_fast() {
    let system = ActorSystem::new();
    let ghost = Pid::new(system.address(), "root/ghost");
    let begun = Instant::now();
    let result = system
        .root()
        .request_reply::<Pong>(
            &ghost,
            Ping("x".to_owned()),
            Duration::from_secs(10),
        )
        .await;
    assert!(matches!(result, Err(Error::DeadLetter(_))));
    // The dead-letter response beats the ten-second timeout by far.
    assert!(begun.elapsed() < Duration::from_millis(100));
}

struct Silent;

#[async_trait]
impl Actor for Silent {
    async fn receive(&mut self, _ctx: &mut ActorContext) -> Result<(), Error> {
        Ok(())
    }
}

#[tokio::test]
async fn test_request_reply_times_out() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Silent)).unwrap();
    let result = system
        .root()
        .request_reply::<Pong>(
            &pid,
            Ping("x".to_owned()),
            Duration::from_millis(100),
        )
        .await;
    assert_eq!(result.unwrap_err(), Error::Timeout);
}

#[tokio::test]
async fn test_reply_of_wrong_type_is_a_mismatch() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Echo)).unwrap();
    let result = system
        .root()
        .request_reply::<String>(
            &pid,
            Ping("x".to_owned()),
            Duration::from_secs(1),
        )
        .await;
    assert!(matches!(result, Err(Error::TypeMismatch(_))));
}

/// Forwards everything to a fixed delegate, keeping the sender intact.
struct Relay {
    delegate: Pid,
}

#[async_trait]
impl Actor for Relay {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if ctx.message::<Ping>().is_some() {
            let delegate = self.delegate.clone();
            ctx.forward(&delegate).await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_forward_preserves_the_original_sender() {
    let system = ActorSystem::new();
    let echo = system.spawn(Props::from_fn(|| Echo)).unwrap();
    let relay = {
        let echo = echo.clone();
        system
            .spawn(Props::from_fn(move || Relay {
                delegate: echo.clone(),
            }))
            .unwrap()
    };
    // The reply must come back to the requester, not to the relay.
    let reply = system
        .root()
        .request_reply::<Pong>(
            &relay,
            Ping("via-relay".to_owned()),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(*reply, Pong("via-relay".to_owned()));
}

#[derive(Debug, Clone)]
struct Fetch;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fetched(u32);

/// Re-enters with the task result instead of blocking its turn.
struct Quoter {
    last: u32,
    log: Arc<Mutex<Vec<String>>>,
}

fn apply_quote<'a>(
    actor: &'a mut dyn Actor,
    ctx: &'a mut ActorContext,
    quote: u32,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if let Some(quoter) = actor.downcast_mut::<Quoter>() {
            quoter.last = quote;
            quoter.log.lock().unwrap().push("continuation".to_owned());
        }
        let _ = ctx.respond(Fetched(quote)).await;
    })
}

#[async_trait]
impl Actor for Quoter {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if ctx.message::<Fetch>().is_some() {
            self.log.lock().unwrap().push("fetch".to_owned());
            let task = async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                42u32
            };
            ctx.reenter_after(task, apply_quote);
        } else if let Some(text) = ctx.message::<String>() {
            self.log.lock().unwrap().push(text.clone());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_reenter_after_releases_the_turn() {
    let system = ActorSystem::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let pid = {
        let log = log.clone();
        system
            .spawn(Props::from_fn(move || Quoter {
                last: 0,
                log: log.clone(),
            }))
            .unwrap()
    };
    let root = system.root();
    let pending = {
        let root = root.clone();
        let pid = pid.clone();
        tokio::spawn(async move {
            root.request_reply::<Fetched>(&pid, Fetch, Duration::from_secs(1))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    // Dispatched while the external task is still sleeping.
    root.send(&pid, "interleaved".to_owned()).await.unwrap();
    let reply = pending.await.unwrap().unwrap();
    assert_eq!(*reply, Fetched(42));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["fetch", "interleaved", "continuation"]
    );
}

#[tokio::test]
async fn test_request_future_honors_external_cancellation() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Silent)).unwrap();
    let token = tokio_util::sync::CancellationToken::new();
    let future = system
        .root()
        .request_future(&pid, Ping("never".to_owned()), None)
        .await
        .unwrap()
        .cancelled_by(token.clone());
    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let result = future.recv::<Pong>().await;
    assert_eq!(result.unwrap_err(), Error::Shutdown);
    cancel.await.unwrap();
}

#[tokio::test]
async fn test_stop_async_resolves_with_the_termination() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Silent)).unwrap();
    let terminated = system
        .root()
        .stop_async(&pid)
        .await
        .terminated()
        .await
        .unwrap();
    assert_eq!(terminated.who, pid);
    assert_eq!(terminated.reason, TerminateReason::Stopped);
}

#[tokio::test]
async fn test_poison_async_resolves_with_the_termination() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Silent)).unwrap();
    let terminated = system
        .root()
        .poison_async(&pid)
        .await
        .terminated()
        .await
        .unwrap();
    assert_eq!(terminated.who, pid);
    assert_eq!(terminated.reason, TerminateReason::Stopped);
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
    let system = ActorSystem::new();
    let root = system.root();
    root.spawn_named(Props::from_fn(|| Silent), "solo").unwrap();
    let result = root.spawn_named(Props::from_fn(|| Silent), "solo");
    assert!(matches!(result, Err(Error::InvalidSpawn(_))));
}

/// Tries to spawn a guardian-bound child when asked; that is only legal
/// from the root.
struct Misspawner;

#[async_trait]
impl Actor for Misspawner {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if ctx.message::<Ping>().is_some() {
            let strategy: Arc<dyn SupervisorStrategy> =
                Arc::new(AlwaysRestartStrategy);
            let outcome = ctx.spawn_named(
                Props::from_fn(|| Silent).with_guardian(strategy),
                "contraband",
            );
            ctx.respond(matches!(outcome, Err(Error::InvalidSpawn(_))))
                .await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_guardian_props_only_spawn_from_root() {
    let system = ActorSystem::new();
    let root = system.root();

    // From the root: allowed, attached under a dedicated guardian.
    let strategy: Arc<dyn SupervisorStrategy> = Arc::new(AlwaysRestartStrategy);
    let guarded = root
        .spawn_named(
            Props::from_fn(|| Silent).with_guardian(strategy),
            "guarded",
        )
        .unwrap();
    assert!(guarded.id().starts_with("guardian-"));

    // From a child context: rejected.
    let pid = system.spawn(Props::from_fn(|| Misspawner)).unwrap();
    let rejected = root
        .request_reply::<bool>(&pid, Ping("go".to_owned()), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(*rejected);
}

/// Fails on every message; used to watch the guardian strategy act.
struct Flapper {
    starts: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Flapper {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if ctx.message::<Started>().is_some() {
            self.starts.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        if ctx.message::<Ping>().is_some() {
            return Err(Error::ActorFailure("flap".to_owned()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_guardian_strategy_supervises_top_level_actors() {
    let system = ActorSystem::new();
    let starts = Arc::new(AtomicUsize::new(0));
    let strategy: Arc<dyn SupervisorStrategy> = Arc::new(AlwaysRestartStrategy);
    let pid = {
        let starts = starts.clone();
        system
            .root()
            .spawn_named(
                Props::from_fn(move || Flapper {
                    starts: starts.clone(),
                })
                .with_guardian(strategy),
                "flapper",
            )
            .unwrap()
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    system
        .root()
        .send(&pid, Ping("boom".to_owned()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(starts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sender_hooks_transform_outgoing_messages() {
    let system = ActorSystem::new();
    let pid = system.spawn(Props::from_fn(|| Echo)).unwrap();
    let upper: SenderHook = Arc::new(|_target, envelope| {
        let transformed = envelope
            .downcast_ref::<Ping>()
            .map(|ping| Ping(ping.0.to_uppercase()));
        match transformed {
            Some(ping) => {
                let mut next = troupe::MessageEnvelope::new(ping);
                if let Some(sender) = envelope.sender() {
                    next = next.with_sender(sender.clone());
                }
                Some(next)
            }
            None => Some(envelope),
        }
    });
    let root = system.root().with_sender_hook(upper);
    let reply = root
        .request_reply::<Pong>(&pid, Ping("hi".to_owned()), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(*reply, Pong("HI".to_owned()));
}

#[tokio::test]
async fn test_receiver_middleware_wraps_every_dispatch() {
    let system = ActorSystem::new();
    let seen = Arc::new(AtomicUsize::new(0));
    fn hrtb_receiver<F>(f: F) -> F
    where
        F: for<'a> Fn(&'a mut dyn Actor, &'a mut ActorContext) -> BoxFuture<'a, Result<(), Error>>
            + Send
            + Sync,
    {
        f
    }
    let middleware: ReceiverMiddleware = {
        let seen = seen.clone();
        Arc::new(move |next: ReceiverFn| {
            let seen = seen.clone();
            Arc::new(hrtb_receiver(
                move |actor: &mut dyn Actor, ctx: &mut ActorContext| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    next(actor, ctx)
                },
            )) as ReceiverFn
        })
    };
    let pid = system
        .spawn(
            Props::from_fn(|| Echo).with_receiver_middleware(middleware),
        )
        .unwrap();
    let root = system.root();
    let _ = root
        .request_reply::<Pong>(&pid, Ping("a".to_owned()), Duration::from_secs(1))
        .await
        .unwrap();
    // `Started` plus one user message went through the chain.
    assert_eq!(seen.load(Ordering::SeqCst), 2);
}

/// Holds its turn long enough for the mailbox to fill up behind it.
struct SlowDrain;

#[async_trait]
impl Actor for SlowDrain {
    async fn receive(&mut self, ctx: &mut ActorContext) -> Result<(), Error> {
        if ctx.message::<String>().is_some() {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_full_mailbox_with_fail_policy_errors_the_sender() {
    let system = ActorSystem::new();
    let pid = system
        .spawn(Props::from_fn(|| SlowDrain).with_mailbox(
            MailboxKind::Bounded {
                capacity: 1,
                policy: OverflowPolicy::Fail,
            },
        ))
        .unwrap();
    let root = system.root();
    root.send(&pid, "busy".to_owned()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    root.send(&pid, "queued".to_owned()).await.unwrap();
    let result = root.send(&pid, "overflow".to_owned()).await;
    assert!(matches!(result, Err(Error::MailboxFull(_))));
}
