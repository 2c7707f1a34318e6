//! Run records and scan reports
//!
//! A run record is the append-only outcome of one attempted agent run for
//! one strategy. A scan report aggregates one full scan cycle.

use crate::scan::lease::DenyReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome status of one attempted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl TryFrom<&str> for RunStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of one attempted run. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub strategy_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    /// Concatenated agent output on success, error text on failure
    pub output: String,
}

impl RunRecord {
    pub fn success(strategy_id: &str, user_id: &str, output: String) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            status: RunStatus::Success,
            output,
        }
    }

    pub fn failure(strategy_id: &str, user_id: &str, error: String) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            status: RunStatus::Failed,
            output: error,
        }
    }
}

/// Per-strategy outcome inside one scan cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanOutcome {
    /// Lease denied; the strategy was not run
    Skipped {
        strategy_id: String,
        reason: DenyReason,
    },
    /// Agent run completed and the record was written
    Completed { strategy_id: String },
    /// Agent run (or its bookkeeping) failed; scan continued
    Failed { strategy_id: String, error: String },
}

impl ScanOutcome {
    pub fn strategy_id(&self) -> &str {
        match self {
            ScanOutcome::Skipped { strategy_id, .. }
            | ScanOutcome::Completed { strategy_id }
            | ScanOutcome::Failed { strategy_id, .. } => strategy_id,
        }
    }
}

/// Aggregate result of one scan cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scanned: usize,
    pub results: Vec<ScanOutcome>,
}

impl ScanReport {
    pub fn completed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ScanOutcome::Completed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ScanOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, ScanOutcome::Skipped { .. }))
            .count()
    }
}
