//! Cycle orchestration: the one-execution-per-interval payout machine.

pub mod cycle;

pub use cycle::{CycleError, CycleOrchestrator, CycleOutcome, CycleResult, CycleStatus};
