//! Execution prompt construction
//!
//! One prompt per granted scan lease, built from the strategy's risk
//! profile, position limit, execution mode, and asset list.

use crate::domain::Strategy;

/// Build the execution prompt for one strategy run.
///
/// The dry-run instruction follows the execution mode: paper strategies
/// always run simulated, live strategies request real execution (which the
/// confirmation gate still intercepts downstream).
pub fn build_execution_prompt(strategy: &Strategy) -> String {
    let is_dry_run = strategy.mode.is_dry_run();

    format!(
        r#"You are executing the trading strategy "{name}".

**Strategy parameters:**
- Assets to scan: {assets}
- Risk profile: {risk}
- Maximum position size: {max_position} USD
- Execution mode: {mode}

**Workflow:**
1. Analyze current market conditions for each asset (price action, technicals, recent news).
2. Check portfolio exposure; never exceed the maximum position size above.
3. Decide: if conditions match the {risk} risk profile, execute; if weak or ambiguous, hold.
4. When executing, call execute_trade with isDryRun={dry_run}.
5. Summarize what you observed and every action you took.

Waiting is a valid position. Do not force trades."#,
        name = strategy.name,
        assets = strategy.assets.join(", "),
        risk = strategy.risk_profile,
        max_position = strategy.max_position_size,
        mode = strategy.mode,
        dry_run = is_dry_run,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionMode, RiskProfile, StrategyStatus};
    use rust_decimal_macros::dec;

    fn strategy(mode: ExecutionMode) -> Strategy {
        Strategy {
            id: "strat-1".to_string(),
            user_id: "user-1".to_string(),
            name: "BTC momentum".to_string(),
            assets: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            interval: "45m".to_string(),
            status: StrategyStatus::Active,
            risk_profile: RiskProfile::Conservative,
            max_position_size: dec!(250),
            mode,
            last_run: None,
            last_attempt: None,
            scan_lock_until: None,
        }
    }

    #[test]
    fn test_paper_mode_requests_dry_run() {
        let prompt = build_execution_prompt(&strategy(ExecutionMode::Paper));
        assert!(prompt.contains("isDryRun=true"));
        assert!(prompt.contains("BTCUSDT, ETHUSDT"));
        assert!(prompt.contains("CONSERVATIVE"));
        assert!(prompt.contains("250"));
    }

    #[test]
    fn test_live_mode_requests_real_execution() {
        let prompt = build_execution_prompt(&strategy(ExecutionMode::Live));
        assert!(prompt.contains("isDryRun=false"));
        assert!(prompt.contains("LIVE"));
    }
}
