//! Pure computation engines for deterministic payout logic.

pub mod allocator;
pub mod cost_basis;
pub mod eligibility;
pub mod ranker;

pub use allocator::{AllocatorError, PayoutAllocator};
pub use cost_basis::CostBasisAggregator;
pub use eligibility::{classify, EligibilityParams, EligibilityResult, IneligibleReason};
pub use ranker::{rank_losers, RankedEntry};
