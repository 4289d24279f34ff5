//! Process-wide token bucket with a bounded, oldest-first wait queue.
//!
//! One [`TokenBucketLimiter`] exists per process and every admitted request
//! (across all connections and worker threads) consumes one token from it.
//! When the bucket is empty a caller may wait in a FIFO queue of at most
//! `queue_limit` entries; beyond that the lease is denied immediately.
//!
//! A background task adds `tokens_per_period` tokens every
//! `replenishment_period` (capped at `token_limit`) and hands them straight to
//! queued callers, oldest first. Waiters are `oneshot` receivers, so a caller
//! that is cancelled while queued simply drops out; its slot is pruned and it
//! never consumes a token. A token handed to a caller that is cancelled before
//! it observes the handover is returned and passed to the next waiter.
//!
//! All mutation happens under a single `std::sync::Mutex` that is never held
//! across an await point, so the token count cannot go negative and the queue
//! cannot grow past its limit.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::oneshot,
    time::{Instant, MissedTickBehavior},
};

use crate::{
    config::models::RateLimitConfig,
    ports::admission::{AdmissionController, AdmissionSnapshot, RateLimitLease, RateLimiterError},
};

/// Validated bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBucketSettings {
    pub token_limit: u32,
    pub tokens_per_period: u32,
    pub replenishment_period: Duration,
    pub queue_limit: usize,
}

impl TokenBucketSettings {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimiterError> {
        let replenishment_period = config.period().map_err(|e| {
            RateLimiterError::InvalidConfig(format!(
                "Invalid period string '{}': {e}",
                config.replenishment_period
            ))
        })?;
        let settings = Self {
            token_limit: config.token_limit,
            tokens_per_period: config.tokens_per_period,
            replenishment_period,
            queue_limit: config.queue_limit,
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), RateLimiterError> {
        if self.token_limit == 0 {
            return Err(RateLimiterError::InvalidConfig(
                "token_limit must be greater than 0".to_string(),
            ));
        }
        if self.tokens_per_period == 0 {
            return Err(RateLimiterError::InvalidConfig(
                "tokens_per_period must be greater than 0".to_string(),
            ));
        }
        if self.replenishment_period.is_zero() {
            return Err(RateLimiterError::InvalidConfig(
                "replenishment_period must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

struct BucketState {
    tokens: u32,
    waiters: VecDeque<oneshot::Sender<()>>,
}

pub struct TokenBucketLimiter {
    settings: TokenBucketSettings,
    state: Mutex<BucketState>,
}

impl TokenBucketLimiter {
    /// Create a full bucket and start its replenishment task.
    ///
    /// Must be called from within a Tokio runtime. The task only holds a weak
    /// reference and exits once the limiter is dropped.
    pub fn new(settings: TokenBucketSettings) -> Arc<Self> {
        let limiter = Arc::new(Self {
            settings,
            state: Mutex::new(BucketState {
                tokens: settings.token_limit,
                waiters: VecDeque::with_capacity(settings.queue_limit),
            }),
        });
        Self::spawn_replenisher(Arc::downgrade(&limiter), settings.replenishment_period);

        tracing::info!(
            token_limit = settings.token_limit,
            tokens_per_period = settings.tokens_per_period,
            replenishment_period = %humantime::format_duration(settings.replenishment_period),
            queue_limit = settings.queue_limit,
            "Created token bucket rate limiter"
        );
        limiter
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Arc<Self>, RateLimiterError> {
        Ok(Self::new(TokenBucketSettings::from_config(config)?))
    }

    pub fn settings(&self) -> &TokenBucketSettings {
        &self.settings
    }

    fn spawn_replenisher(limiter: Weak<Self>, period: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match limiter.upgrade() {
                    Some(limiter) => limiter.replenish(),
                    None => break,
                }
            }
            tracing::debug!("Rate limiter dropped, replenishment task exiting");
        });
    }

    /// Add one period's worth of tokens and serve queued callers oldest-first.
    fn replenish(&self) {
        let mut state = match self.lock() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Skipping token replenishment: {}", e);
                return;
            }
        };

        state.tokens = state
            .tokens
            .saturating_add(self.settings.tokens_per_period)
            .min(self.settings.token_limit);
        let handed_over = Self::hand_over(&mut state);

        tracing::trace!(
            available = state.tokens,
            handed_over,
            still_queued = state.waiters.len(),
            "Replenished rate limiter tokens"
        );
    }

    /// Give a token back that a cancelled waiter was handed but never used.
    fn restore_token(&self) {
        let Ok(mut state) = self.lock() else {
            return;
        };
        state.tokens = state.tokens.saturating_add(1).min(self.settings.token_limit);
        let handed_over = Self::hand_over(&mut state);
        tracing::trace!(handed_over, "Restored token from cancelled waiter");
    }

    /// Move available tokens to queued callers, oldest first.
    fn hand_over(state: &mut BucketState) -> usize {
        let mut handed_over = 0usize;
        while state.tokens > 0 {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            // A failed send means the caller was cancelled; the token stays.
            if waiter.send(()).is_ok() {
                state.tokens -= 1;
                handed_over += 1;
            }
        }
        handed_over
    }

    fn lock(&self) -> Result<MutexGuard<'_, BucketState>, RateLimiterError> {
        self.state.lock().map_err(|_| RateLimiterError::Poisoned)
    }
}

#[async_trait]
impl AdmissionController for TokenBucketLimiter {
    async fn try_acquire(&self) -> Result<RateLimitLease, RateLimiterError> {
        let waiter = {
            let mut state = self.lock()?;
            state.waiters.retain(|w| !w.is_closed());

            if state.tokens > 0 {
                state.tokens -= 1;
                return Ok(RateLimitLease::granted());
            }
            if state.waiters.len() >= self.settings.queue_limit {
                return Ok(RateLimitLease::denied());
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            QueuedWaiter {
                limiter: self,
                receiver: Some(rx),
            }
        };

        waiter.wait().await
    }

    fn snapshot(&self) -> AdmissionSnapshot {
        let (available_tokens, queued) = match self.lock() {
            Ok(state) => (
                state.tokens,
                state.waiters.iter().filter(|w| !w.is_closed()).count(),
            ),
            Err(_) => (0, 0),
        };
        AdmissionSnapshot {
            available_tokens,
            queued,
            token_limit: self.settings.token_limit,
            tokens_per_period: self.settings.tokens_per_period,
            replenishment_period_secs: self.settings.replenishment_period.as_secs(),
            queue_limit: self.settings.queue_limit,
        }
    }
}

/// Receiving end of a queued `try_acquire`. Dropping it after a token was
/// sent but before it was observed puts that token back in the bucket.
struct QueuedWaiter<'a> {
    limiter: &'a TokenBucketLimiter,
    receiver: Option<oneshot::Receiver<()>>,
}

impl QueuedWaiter<'_> {
    async fn wait(mut self) -> Result<RateLimitLease, RateLimiterError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(RateLimiterError::Closed);
        };
        let outcome = receiver.await;
        self.receiver = None;
        outcome
            .map(|()| RateLimitLease::granted())
            .map_err(|_| RateLimiterError::Closed)
    }
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        let Some(mut receiver) = self.receiver.take() else {
            return;
        };
        receiver.close();
        if receiver.try_recv().is_ok() {
            self.limiter.restore_token();
        }
    }
}
