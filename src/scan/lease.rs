//! Scan lease coordination
//!
//! Grants at most one concurrent run per strategy. The admission rules live
//! in [`decide`], a pure function every store implementation evaluates
//! against a freshly-read document inside one atomic read-modify-write
//! transaction. Leases self-expire, so a crashed runner frees its strategy
//! within the TTL cap instead of blocking it indefinitely.

use crate::domain::Strategy;
use crate::error::{AutopilotError, Result};
use crate::store::StrategyStore;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on how long a grant may hold the lock, regardless of the
/// strategy's scan interval.
pub const LEASE_TTL_CAP: Duration = Duration::minutes(10);

/// Bounded retry on write conflicts before the acquisition is reported as
/// failed (never as a silent skip).
const MAX_ACQUIRE_ATTEMPTS: u8 = 3;
const RETRY_BACKOFF_MS: u64 = 50;

/// Why a lease was denied. Denial is a normal skip outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyReason {
    /// Strategy is not ACTIVE
    Inactive,
    /// Another runner holds an unexpired lease
    Locked,
    /// The scan interval has not elapsed since the last activity
    Interval,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Inactive => "inactive",
            DenyReason::Locked => "locked",
            DenyReason::Interval => "interval",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a lease acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDecision {
    Granted { lock_until: DateTime<Utc> },
    Denied(DenyReason),
}

impl LeaseDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, LeaseDecision::Granted { .. })
    }
}

/// Admission rules for one strategy at one instant.
///
/// Pure: callers are responsible for evaluating this against a fresh read
/// and persisting the granted lock fields in the same atomic transaction.
pub fn decide(strategy: &Strategy, now: DateTime<Utc>) -> LeaseDecision {
    if strategy.status != crate::domain::StrategyStatus::Active {
        return LeaseDecision::Denied(DenyReason::Inactive);
    }

    let interval = strategy.scan_interval();

    if let Some(lock_until) = strategy.scan_lock_until {
        if lock_until > now {
            return LeaseDecision::Denied(DenyReason::Locked);
        }
    }

    if let Some(last_activity) = strategy.last_activity() {
        if now - last_activity < interval {
            return LeaseDecision::Denied(DenyReason::Interval);
        }
    }

    LeaseDecision::Granted {
        lock_until: now + interval.min(LEASE_TTL_CAP),
    }
}

/// Acquires and releases scan leases through a [`StrategyStore`].
///
/// Conflict-prone acquisitions are retried a bounded number of times with
/// jittered backoff; exhaustion surfaces as
/// [`AutopilotError::LeaseConflict`] so the orchestrator records a FAILED
/// run for the strategy instead of skipping it silently.
pub struct LeaseCoordinator<S: StrategyStore + ?Sized> {
    store: Arc<S>,
}

impl<S: StrategyStore + ?Sized> LeaseCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Try to acquire the scan lease for a strategy.
    pub async fn try_acquire(&self, strategy_id: &str) -> Result<LeaseDecision> {
        let mut attempts = 0u8;

        loop {
            attempts += 1;
            match self.store.try_acquire(strategy_id, Utc::now()).await {
                Ok(decision) => {
                    match &decision {
                        LeaseDecision::Granted { lock_until } => {
                            debug!("Lease granted for {} until {}", strategy_id, lock_until);
                        }
                        LeaseDecision::Denied(reason) => {
                            debug!("Lease denied for {}: {}", strategy_id, reason);
                        }
                    }
                    return Ok(decision);
                }
                Err(e) if e.is_retryable_conflict() && attempts < MAX_ACQUIRE_ATTEMPTS => {
                    let jitter = rand::thread_rng().gen_range(0..RETRY_BACKOFF_MS);
                    let backoff = RETRY_BACKOFF_MS * attempts as u64 + jitter;
                    warn!(
                        "Lease transaction conflict for {} (attempt {}), retrying in {}ms",
                        strategy_id, attempts, backoff
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
                Err(e) if e.is_retryable_conflict() => {
                    return Err(AutopilotError::LeaseConflict {
                        strategy_id: strategy_id.to_string(),
                        attempts,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release the lease after a run. Clears the lock unconditionally;
    /// `last_run` advances only on success so a failed strategy becomes
    /// eligible again on the next cycle.
    pub async fn release(&self, strategy_id: &str, success: bool) -> Result<()> {
        self.store
            .release(strategy_id, success, Utc::now())
            .await
    }
}
