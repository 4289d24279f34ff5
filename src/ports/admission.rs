use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Error type for admission control faults. These are implementation faults of
/// the limiter itself, never a routine "over the limit" outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RateLimiterError {
    /// Limiter parameters could not be turned into a working bucket
    #[error("Invalid rate limiter configuration: {0}")]
    InvalidConfig(String),

    /// Internal state lock was poisoned by a panicking holder
    #[error("Rate limiter state is poisoned")]
    Poisoned,

    /// The limiter went away while the caller was queued
    #[error("Rate limiter closed while waiting for a token")]
    Closed,
}

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitLease {
    pub acquired: bool,
}

impl RateLimitLease {
    pub fn granted() -> Self {
        Self { acquired: true }
    }

    pub fn denied() -> Self {
        Self { acquired: false }
    }
}

/// Read-only view of limiter state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionSnapshot {
    pub available_tokens: u32,
    pub queued: usize,
    pub token_limit: u32,
    pub tokens_per_period: u32,
    pub replenishment_period_secs: u64,
    pub queue_limit: usize,
}

/// AdmissionController defines the port for the process-wide admission gate
#[async_trait]
pub trait AdmissionController: Send + Sync + 'static {
    /// Take one unit of capacity, waiting in a bounded queue if none is
    /// available right now.
    ///
    /// # Returns
    /// A lease whose `acquired` flag tells whether the request may proceed, or
    /// an error if the limiter itself failed
    async fn try_acquire(&self) -> Result<RateLimitLease, RateLimiterError>;

    /// Current state for the status endpoints
    fn snapshot(&self) -> AdmissionSnapshot;
}
