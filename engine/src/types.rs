use serde::{Deserialize, Serialize};

/// An opaque on-chain-style identifier: a wallet, a token contract, a pool.
pub type Address = String;

pub type OrderId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
  Long,
  Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseType {
  User,
  ThirdParty,
}

/// An open leveraged order: immutable at open except for the proportional
/// fields a partial close shrinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
  pub order_id: OrderId,
  pub order_type: OrderType,
  pub address: Address,

  pub open_price: f64,
  pub forced_close_price: f64,

  /// liquidation footprint: the interval the pool sweeps if this order is
  /// force-closed right now at `forced_close_price`.
  pub low_price: f64,
  pub high_price: f64,

  pub base_amount1: f64,

  /// short-only: token0 borrowed from `loan_reserve0`.
  pub lend_amount0: Option<f64>,
  /// short-only: token1 received selling the borrowed token0 at open.
  pub sell_amount1: Option<f64>,

  /// long-only: token1 borrowed from `loan_reserve1`.
  pub lend_amount1: Option<f64>,
  /// long-only: token0 bought at open with `base_amount1 + lend_amount1`.
  pub buy_amount0: Option<f64>,

  pub loan_fee: f64,
  pub loan_day_fee: f64,
  pub third_fee: f64,

  pub loan_time: i64,

  pub high_node: Option<OrderId>,
  pub low_node: Option<OrderId>,
}

/// An order once it has been fully closed, moved into the append-only
/// per-address history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedOrder {
  pub order: Order,
  pub close_price: f64,
  pub close_timestamp: i64,
  pub close_type: CloseType,
  pub profit_loss: f64,
  pub pct_loss: f64,
}
