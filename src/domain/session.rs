//! Run sessions
//!
//! One session exists per agent run. It carries the framework's key/value
//! state plus the typed fields this subsystem owns: the trade-confirmation
//! state machine, the cached-context handle, and the memory checkpoint.
//! Sessions are owned exclusively by the run that created them.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("buy"),
            TradeSide::Sell => f.write_str("sell"),
        }
    }
}

/// Arguments of an intercepted trade-execution call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeProposal {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    /// Absent means a market order
    #[serde(default)]
    pub price: Option<Decimal>,
    /// Absent defaults to true: paper unless explicitly requested live
    #[serde(default)]
    pub is_dry_run: Option<bool>,
}

impl TradeProposal {
    /// A trade is simulated unless the flag is explicitly false.
    pub fn is_simulated(&self) -> bool {
        self.is_dry_run.unwrap_or(true)
    }
}

/// Confirmation state machine for the one gated high-risk operation.
///
/// `Awaiting` and `Confirmed` always carry the pending proposal, so
/// "awaiting confirmation with no pending trade" cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConfirmationState {
    #[default]
    Idle,
    Awaiting {
        pending: TradeProposal,
    },
    Confirmed {
        pending: TradeProposal,
    },
}

impl ConfirmationState {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, ConfirmationState::Awaiting { .. })
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmationState::Confirmed { .. })
    }
}

/// Remote cached-content reference with its content address.
///
/// Validity is re-derived on every use: the stored hash is compared against
/// a fresh hash of the current content, never trusted blindly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedContextHandle {
    /// Opaque remote resource name
    pub name: String,
    /// Hex sha-256 of the cached text
    pub content_hash: String,
    /// Model the handle was created for
    pub model: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedContextHandle {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Typed session state owned by this subsystem
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub confirmation: ConfirmationState,
    #[serde(default)]
    pub rag_cache: Option<CachedContextHandle>,
    /// Total events observed in this session
    #[serde(default)]
    pub event_count: u64,
    /// Event count at the last memory consolidation
    #[serde(default)]
    pub memory_event_count: u64,
    /// Framework-owned keys this subsystem passes through untouched
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One agent run's session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub id: String,
    pub user_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl RunSession {
    pub fn new(user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            state: SessionState::default(),
            created_at: Utc::now(),
        }
    }
}
