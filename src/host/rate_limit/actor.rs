use super::scheduler::{Permit, RateSnapshot, RateWindow};
use crate::error::VaultError;
use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum RateLimiterMessage {
    /// Ask for one request slot.
    Acquire(RpcReplyPort<Permit>),

    /// Rate-limit headers observed on a host response.
    Report {
        remaining: u64,
        reset_at: DateTime<Utc>,
    },

    /// The host rejected a request because the budget is spent.
    Throttled { reset_at: DateTime<Utc> },

    Snapshot(RpcReplyPort<RateSnapshot>),
}

/// Process-wide view of the host's rate limit, shared by every worker.
#[derive(Clone)]
pub struct RateLimiterHandle {
    actor: ActorRef<RateLimiterMessage>,
    max_wait: Duration,
}

impl RateLimiterHandle {
    /// Wait until a request may be issued.
    ///
    /// Suspends until the host's reset time when the remaining budget is below the threshold;
    /// fails with `RateLimitWaitTooLong` if that wait would exceed the configured maximum.
    pub async fn acquire(&self) -> Result<(), VaultError> {
        loop {
            let permit = ractor::call!(self.actor, RateLimiterMessage::Acquire).map_err(|e| {
                VaultError::RactorError(format!("RateLimiter Acquire RPC failed: {e}"))
            })?;

            let reset_at = match permit {
                Permit::Go => return Ok(()),
                Permit::WaitUntil(reset_at) => reset_at,
            };

            let wait = (reset_at - Utc::now()).to_std().unwrap_or_default();
            if wait > self.max_wait {
                warn!(%reset_at, wait_secs = wait.as_secs(), "Host rate limit reset is too far away");
                return Err(VaultError::RateLimitWaitTooLong { reset_at });
            }

            info!(%reset_at, wait_secs = wait.as_secs(), "Host rate limit low; suspending requests");
            tokio::time::sleep(wait + Duration::from_millis(250)).await;
        }
    }

    pub fn report(&self, remaining: u64, reset_at: DateTime<Utc>) {
        let _ = ractor::cast!(
            self.actor,
            RateLimiterMessage::Report {
                remaining,
                reset_at
            }
        );
    }

    pub fn throttled(&self, reset_at: DateTime<Utc>) {
        let _ = ractor::cast!(self.actor, RateLimiterMessage::Throttled { reset_at });
    }

    pub async fn snapshot(&self) -> Result<RateSnapshot, VaultError> {
        ractor::call!(self.actor, RateLimiterMessage::Snapshot)
            .map_err(|e| VaultError::RactorError(format!("RateLimiter Snapshot RPC failed: {e}")))
    }
}

struct RateLimiterActor;

#[ractor::async_trait]
impl Actor for RateLimiterActor {
    type Msg = RateLimiterMessage;
    type State = RateWindow;
    type Arguments = u64;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        threshold: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(threshold, "RateLimiterActor started");
        Ok(RateWindow::new(threshold))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RateLimiterMessage::Acquire(reply) => {
                let _ = reply.send(state.acquire(Utc::now()));
            }
            RateLimiterMessage::Report {
                remaining,
                reset_at,
            } => {
                state.report(remaining, reset_at);
                debug!(remaining, %reset_at, "Host rate limit reported");
            }
            RateLimiterMessage::Throttled { reset_at } => {
                warn!(%reset_at, "Host throttled a request");
                state.throttled(reset_at);
            }
            RateLimiterMessage::Snapshot(reply) => {
                let _ = reply.send(state.snapshot());
            }
        }
        Ok(())
    }
}

/// Spawn the limiter. Below `threshold` remaining requests it holds requests until reset.
pub async fn spawn(threshold: u64, max_wait: Duration) -> RateLimiterHandle {
    let (actor, _jh) = Actor::spawn(None, RateLimiterActor, threshold)
        .await
        .expect("failed to spawn RateLimiterActor");

    RateLimiterHandle { actor, max_wait }
}
