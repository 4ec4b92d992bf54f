//! Leveraged constant-product AMM trading, borrowing, and forced-
//! liquidation engine: a single `(token0, token1)` spot pool backed by two
//! lending pools that finance leveraged long and short positions.
//!
//! `SwapMath` ([`swap_math`]) is the closed-form pricing kernel; `OrderBook`
//! ([`order_book`]) keeps short/long liquidation intervals disjoint and
//! ordered; `Pool` ([`pool`]) is the state machine that ties reserves, loan
//! reserves, and the book together behind six operations (`buy`, `sell`,
//! `open_short`, `open_long`, `close_short`, `close_long`); `Hub` ([`hub`])
//! serializes access to a `Pool` and hosts the fast-open solver; `Factory`
//! ([`factory`]) mints a pool's token0 supply and wires up a fresh `Hub`.

pub mod config;
pub mod error;
pub mod factory;
pub mod hub;
pub mod ledger;
pub mod order_book;
pub mod pool;
pub mod swap_math;
pub mod types;

pub use config::PoolConfig;
pub use error::{EngineError, EngineResult};
pub use factory::{Factory, PoolParams};
pub use hub::{Hub, LongFastOpenHint, ShortFastOpenHint};
pub use ledger::Ledger;
pub use order_book::OrderBook;
pub use pool::{OpOutcome, Pool, PoolInfo};
pub use types::{Address, ClosedOrder, CloseType, Order, OrderId, OrderType};

/// Initialize the process-wide logger. Safe to call more than once per
/// process only if each caller tolerates the first call winning; intended
/// to be called exactly once from a binary's `main`.
pub fn init_logger() {
  common::init_logger();
}
