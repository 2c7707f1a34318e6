pub mod lease;
pub mod orchestrator;
pub mod run_log;

pub use lease::{decide, DenyReason, LeaseCoordinator, LeaseDecision, LEASE_TTL_CAP};
pub use orchestrator::ScanOrchestrator;
pub use run_log::RunLogger;
