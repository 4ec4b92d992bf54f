//! Policy parameters fixed at pool construction.

use std::env;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolConfig {
  /// spot swap fee retained in-pool, e.g. 0.997 = 0.3% fee.
  pub fee: f64,
  /// one-time fee charged against borrowed principal at open.
  pub loan_fee: f64,
  /// per-day accrual rate applied to borrowed principal while a position
  /// is open.
  pub loan_day_fee: f64,
  /// fee taken by a forced close.
  pub forced_close_fee: f64,
  /// flat fee added to every forced close regardless of size.
  pub forced_close_base_amount: f64,
  /// max ratio of borrowed principal to posted margin.
  pub leverage_limit: f64,
  /// minimum number of seconds a loan must be open before `loan_day_fee`
  /// accrues for a full day.
  pub lending_second_limit: i64,
  /// max fraction of reserves a single forced close may sweep.
  pub force_move_rate: f64,
  /// min fraction of reserves a partial close must move, once admissible.
  pub force_move_slack: f64,
  /// max number of concurrently open orders per address.
  pub order_max_length: usize,
}

impl Default for PoolConfig {
  fn default() -> Self {
    let force_move_rate = 0.10;
    Self {
      fee: 0.997,
      loan_fee: 0.99,
      loan_day_fee: 0.9995,
      forced_close_fee: 0.995,
      forced_close_base_amount: 5.0,
      leverage_limit: 5.0,
      lending_second_limit: 900,
      force_move_rate,
      force_move_slack: force_move_rate * 0.5,
      order_max_length: 50,
    }
  }
}

impl PoolConfig {
  /// Override defaults from `ENGINE_*` environment variables where set,
  /// layering env over the built-in defaults.
  pub fn from_env() -> Self {
    let mut cfg = Self::default();
    macro_rules! override_f64 {
      ($var:expr, $field:expr) => {
        if let Ok(val) = env::var($var) {
          if let Ok(parsed) = val.parse::<f64>() {
            $field = parsed;
          }
        }
      };
    }
    override_f64!("ENGINE_FEE", cfg.fee);
    override_f64!("ENGINE_LOAN_FEE", cfg.loan_fee);
    override_f64!("ENGINE_LOAN_DAY_FEE", cfg.loan_day_fee);
    override_f64!("ENGINE_FORCED_CLOSE_FEE", cfg.forced_close_fee);
    override_f64!("ENGINE_FORCED_CLOSE_BASE_AMOUNT", cfg.forced_close_base_amount);
    override_f64!("ENGINE_LEVERAGE_LIMIT", cfg.leverage_limit);
    override_f64!("ENGINE_FORCE_MOVE_RATE", cfg.force_move_rate);
    override_f64!("ENGINE_FORCE_MOVE_SLACK", cfg.force_move_slack);
    if let Ok(val) = env::var("ENGINE_LENDING_SECOND_LIMIT") {
      if let Ok(parsed) = val.parse::<i64>() {
        cfg.lending_second_limit = parsed;
      }
    }
    if let Ok(val) = env::var("ENGINE_ORDER_MAX_LENGTH") {
      if let Ok(parsed) = val.parse::<usize>() {
        cfg.order_max_length = parsed;
      }
    }
    cfg
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_constants() {
    let cfg = PoolConfig::default();
    assert_eq!(cfg.fee, 0.997);
    assert_eq!(cfg.loan_fee, 0.99);
    assert_eq!(cfg.loan_day_fee, 0.9995);
    assert_eq!(cfg.forced_close_fee, 0.995);
    assert_eq!(cfg.forced_close_base_amount, 5.0);
    assert_eq!(cfg.leverage_limit, 5.0);
    assert_eq!(cfg.lending_second_limit, 900);
    assert_eq!(cfg.force_move_rate, 0.10);
    assert_eq!(cfg.force_move_slack, 0.05);
    assert_eq!(cfg.order_max_length, 50);
  }
}
