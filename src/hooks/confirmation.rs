//! Trade confirmation gate
//!
//! A three-state machine (idle → awaiting confirmation → confirmed) scoped
//! to one run session, intercepting the single high-risk tool. Simulated
//! trades and trades with live execution disabled pass through untouched.
//! A live trade is blocked until a separate confirmation operation has set
//! the confirmed state, and each confirmation is consumed by exactly one
//! execution.
//!
//! Known relaxation, preserved from observed behavior pending a product
//! decision: with no session attached to the run context the gate passes
//! the call through ungated (see `live_trade_without_session_passes_ungated`
//! in the integration tests).

use crate::agent::{ToolCall, ToolDisposition};
use crate::domain::{ConfirmationState, TradeProposal};
use crate::error::Result;
use crate::hooks::{RunContext, RunHook};
use crate::store::SessionStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// The one tool this gate applies to
pub const TRADE_EXECUTION_TOOL: &str = "execute_trade";

pub struct ConfirmationGate {
    live_trading_enabled: bool,
    sessions: Arc<dyn SessionStore>,
}

impl ConfirmationGate {
    pub fn new(live_trading_enabled: bool, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            live_trading_enabled,
            sessions,
        }
    }

    /// The only way to arm the gate: promote an awaiting session to
    /// confirmed. Performs no trading action itself. Returns false when
    /// the session had no pending trade to confirm.
    pub async fn confirm_pending_trade(&self, session_id: &str) -> Result<bool> {
        let Some(mut session) = self.sessions.fetch(session_id).await? else {
            return Err(crate::error::AutopilotError::SessionNotFound(
                session_id.to_string(),
            ));
        };

        match session.state.confirmation.clone() {
            ConfirmationState::Awaiting { pending } => {
                session.state.confirmation = ConfirmationState::Confirmed { pending };
                self.sessions.update(&session).await?;
                info!("Pending trade confirmed for session {}", session_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn confirmation_message(proposal: &TradeProposal) -> String {
        let price = proposal
            .price
            .map(|p| p.to_string())
            .unwrap_or_else(|| "market".to_string());
        format!(
            "CONFIRM TRADE: Please confirm the execution of {} {} {} @ {}. \
             Respond with \"CONFIRM\" to proceed.",
            proposal.side, proposal.quantity, proposal.symbol, price
        )
    }

    fn blocked(message: String) -> ToolDisposition {
        ToolDisposition::Block(serde_json::json!({
            "blocked": true,
            "message": message,
        }))
    }
}

#[async_trait]
impl RunHook for ConfirmationGate {
    fn name(&self) -> &'static str {
        "confirmation_gate"
    }

    async fn before_tool(&self, ctx: &RunContext, call: &ToolCall) -> Result<ToolDisposition> {
        if call.name != TRADE_EXECUTION_TOOL {
            return Ok(ToolDisposition::Proceed);
        }

        let proposal: TradeProposal = match serde_json::from_value(call.args.clone()) {
            Ok(proposal) => proposal,
            Err(e) => {
                // Malformed arguments cannot request live execution; the
                // tool itself defaults to a dry run.
                warn!("Unparsable {} arguments: {}", TRADE_EXECUTION_TOOL, e);
                return Ok(ToolDisposition::Proceed);
            }
        };

        if proposal.is_simulated() || !self.live_trading_enabled {
            return Ok(ToolDisposition::Proceed);
        }

        let Some(session) = ctx.session.as_ref() else {
            warn!(
                "Live {} intercepted with no session attached, passing through ungated",
                TRADE_EXECUTION_TOOL
            );
            return Ok(ToolDisposition::Proceed);
        };

        let mut session = session.lock().await;

        if session.state.confirmation.is_confirmed() {
            info!(
                "Confirmed live trade allowed for session {}: {} {} {}",
                session.id, proposal.side, proposal.quantity, proposal.symbol
            );
            // One-time use: a second live trade needs a fresh confirmation.
            session.state.confirmation = ConfirmationState::Idle;
            if let Err(e) = self.sessions.update(&session).await {
                warn!("Failed to persist confirmation consumption: {}", e);
                return Ok(Self::blocked(
                    "Trade not executed: confirmation state could not be persisted.".to_string(),
                ));
            }
            return Ok(ToolDisposition::Proceed);
        }

        info!(
            "Blocking live trade for session {}: {} {} {}",
            session.id, proposal.side, proposal.quantity, proposal.symbol
        );
        let message = Self::confirmation_message(&proposal);
        session.state.confirmation = ConfirmationState::Awaiting {
            pending: proposal,
        };
        if let Err(e) = self.sessions.update(&session).await {
            // Blocking is the safe direction even when the state write fails.
            warn!("Failed to persist awaiting confirmation: {}", e);
        }

        Ok(Self::blocked(message))
    }
}
