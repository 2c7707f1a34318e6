//! Schedulable strategy documents
//!
//! A strategy is a user-owned configuration describing which assets to scan,
//! on what cadence, under what risk/size constraints, in paper or live mode.
//! This subsystem mutates only the scheduling fields (`scan_lock_until`,
//! `last_attempt`, `last_run`); everything else is owned by the user surface.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interval used when a strategy's interval string cannot be parsed
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::hours(1);

/// Strategy lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyStatus {
    Active,
    Paused,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "ACTIVE",
            StrategyStatus::Paused => "PAUSED",
        }
    }
}

impl TryFrom<&str> for StrategyStatus {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ACTIVE" => Ok(StrategyStatus::Active),
            "PAUSED" => Ok(StrategyStatus::Paused),
            other => Err(format!("unknown strategy status: {other}")),
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk posture the execution prompt instructs the agent to honor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "CONSERVATIVE",
            RiskProfile::Moderate => "MODERATE",
            RiskProfile::Aggressive => "AGGRESSIVE",
        }
    }
}

impl TryFrom<&str> for RiskProfile {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "CONSERVATIVE" => Ok(RiskProfile::Conservative),
            "MODERATE" => Ok(RiskProfile::Moderate),
            "AGGRESSIVE" => Ok(RiskProfile::Aggressive),
            other => Err(format!("unknown risk profile: {other}")),
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paper executions report results without transferring real value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Paper => "PAPER",
            ExecutionMode::Live => "LIVE",
        }
    }

    /// Paper mode always runs trades as dry runs
    pub fn is_dry_run(&self) -> bool {
        matches!(self, ExecutionMode::Paper)
    }
}

impl TryFrom<&str> for ExecutionMode {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PAPER" => Ok(ExecutionMode::Paper),
            "LIVE" => Ok(ExecutionMode::Live),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted strategy document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub user_id: String,
    pub name: String,
    /// Asset symbols this strategy scans (e.g. ["BTCUSDT", "ETHUSDT"])
    pub assets: Vec<String>,
    /// Scan cadence as `<integer><s|m|h|d>`, e.g. "45m"
    pub interval: String,
    pub status: StrategyStatus,
    pub risk_profile: RiskProfile,
    pub max_position_size: Decimal,
    pub mode: ExecutionMode,
    /// Last successful run completion
    pub last_run: Option<DateTime<Utc>>,
    /// Last attempted run start, successful or not
    pub last_attempt: Option<DateTime<Utc>>,
    /// Present and in the future while a runner holds the scan lease
    pub scan_lock_until: Option<DateTime<Utc>>,
}

impl Strategy {
    /// Scan interval for this strategy; unparsable strings fall back to
    /// [`DEFAULT_SCAN_INTERVAL`].
    pub fn scan_interval(&self) -> Duration {
        parse_interval(&self.interval).unwrap_or(DEFAULT_SCAN_INTERVAL)
    }

    /// Most recent activity timestamp: max of last_run and last_attempt.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.last_run, self.last_attempt) {
            (Some(run), Some(attempt)) => Some(run.max(attempt)),
            (Some(run), None) => Some(run),
            (None, Some(attempt)) => Some(attempt),
            (None, None) => None,
        }
    }
}

/// Parse an interval string of the form `<integer><s|m|h|d>`.
///
/// The unit is case-insensitive and may be preceded by whitespace
/// ("45m", "6 H", "1d"). Returns `None` for anything else.
pub fn parse_interval(raw: &str) -> Option<Duration> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }

    let unit = trimmed.chars().last()?;
    let digits = trimmed[..trimmed.len() - unit.len_utf8()].trim_end();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = digits.parse().ok()?;

    match unit.to_ascii_lowercase() {
        's' => Some(Duration::seconds(value)),
        'm' => Some(Duration::minutes(value)),
        'h' => Some(Duration::hours(value)),
        'd' => Some(Duration::days(value)),
        _ => None,
    }
}
