use thiserror::Error;

/// Every failure mode the engine can produce, grouped by cause. Every op
/// returns `Result<T, EngineError>`; on `Err` the caller is guaranteed no
/// observable state (reserves, loan reserves, order book, address maps,
/// ledger balances) was mutated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
  #[error("{0}")]
  Precondition(String),

  #[error("{0}")]
  Policy(String),

  #[error("{0}")]
  Book(String),

  #[error("{0}")]
  Solvency(String),

  #[error("{0}")]
  ThirdPartyGate(String),

  #[error("{0}")]
  Solver(String),

  #[error("ledger transfer failed: {0}")]
  Ledger(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
