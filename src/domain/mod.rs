//! Domain types shared across the crate.

pub mod cycle;
pub mod decimal;
pub mod event;
pub mod holder;
pub mod primitives;

pub use cycle::{CyclePayout, CycleTimerState, Disqualification, PayoutStatus};
pub use decimal::Decimal;
pub use event::TokenEvent;
pub use holder::HolderSnapshot;
pub use primitives::{TimeMs, TxKind, Wallet};
