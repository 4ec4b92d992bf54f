//! Pure constant-product AMM math. No state, no I/O, closed-form only —
//! this is what keeps the order engine deterministic and cheap (no
//! numerical search is ever needed to open or force-close a position).

use crate::error::{EngineError, EngineResult};

/// Spot price, `reserve1 / reserve0`.
pub fn price(reserve0: f64, reserve1: f64) -> f64 {
  reserve1 / reserve0
}

/// Result of swapping a known amount of one reserve into the other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapOut {
  pub amount_out: f64,
  pub fee_amount: f64,
  pub new_reserve0: f64,
  pub new_reserve1: f64,
  pub price_before: f64,
  pub price_after: f64,
}

/// Result of solving for the input amount required to produce a desired
/// output amount.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapIn {
  pub amount_in: f64,
  pub fee_amount: f64,
  pub new_reserve0: f64,
  pub new_reserve1: f64,
  pub price_before: f64,
  pub price_after: f64,
}

/// Sell `amount0_in` of token0 into the pool, receiving token1.
/// Fee is retained in-pool: `k` strictly grows (the fee is skimmed off the
/// input before the constant-product swap, so nothing leaves on the fee
/// leg).
pub fn swap0_for_1(amount0_in: f64, reserve0: f64, reserve1: f64, fee: f64) -> EngineResult<SwapOut> {
  let amount0_in_with_fee = amount0_in * fee;
  let fee_amount = amount0_in - amount0_in_with_fee;
  let numerator = amount0_in_with_fee * reserve1;
  let denominator = reserve0 + amount0_in_with_fee;
  let amount1_out = numerator / denominator;
  if amount1_out >= reserve1 {
    return Err(EngineError::Precondition("insufficient liquidity".into()));
  }
  let new_reserve0 = reserve0 + amount0_in_with_fee;
  let new_reserve1 = reserve1 - amount1_out;
  Ok(SwapOut {
    amount_out: amount1_out,
    fee_amount,
    new_reserve0,
    new_reserve1,
    price_before: price(reserve0, reserve1),
    price_after: price(new_reserve0, new_reserve1),
  })
}

/// Sell `amount1_in` of token1 into the pool, receiving token0.
pub fn swap1_for_0(amount1_in: f64, reserve0: f64, reserve1: f64, fee: f64) -> EngineResult<SwapOut> {
  let amount1_in_with_fee = amount1_in * fee;
  let fee_amount = amount1_in - amount1_in_with_fee;
  let numerator = amount1_in_with_fee * reserve0;
  let denominator = reserve1 + amount1_in_with_fee;
  let amount0_out = numerator / denominator;
  if amount0_out >= reserve0 {
    return Err(EngineError::Precondition("insufficient liquidity".into()));
  }
  let new_reserve0 = reserve0 - amount0_out;
  let new_reserve1 = reserve1 + amount1_in_with_fee;
  Ok(SwapOut {
    amount_out: amount0_out,
    fee_amount,
    new_reserve0,
    new_reserve1,
    price_before: price(reserve0, reserve1),
    price_after: price(new_reserve0, new_reserve1),
  })
}

/// Solve for the amount1 required to buy exactly `amount0_out` of token0.
pub fn amount1_in_for_amount0_out(
  amount0_out: f64,
  reserve0: f64,
  reserve1: f64,
  fee: f64,
) -> EngineResult<SwapIn> {
  if amount0_out >= reserve0 {
    return Err(EngineError::Precondition("insufficient liquidity".into()));
  }
  let numerator = reserve1 * amount0_out;
  let denominator = (reserve0 - amount0_out) * fee;
  let amount1_in = numerator / denominator;
  let fee_amount = amount1_in * (1.0 - fee);
  let amount1_in_with_fee = amount1_in - fee_amount;
  let new_reserve0 = reserve0 - amount0_out;
  let new_reserve1 = reserve1 + amount1_in_with_fee;
  Ok(SwapIn {
    amount_in: amount1_in,
    fee_amount,
    new_reserve0,
    new_reserve1,
    price_before: price(reserve0, reserve1),
    price_after: price(new_reserve0, new_reserve1),
  })
}

/// Solve for the amount0 required to buy exactly `amount1_out` of token1.
pub fn amount0_in_for_amount1_out(
  amount1_out: f64,
  reserve0: f64,
  reserve1: f64,
  fee: f64,
) -> EngineResult<SwapIn> {
  if amount1_out >= reserve1 {
    return Err(EngineError::Precondition("insufficient liquidity".into()));
  }
  let numerator = amount1_out * reserve0;
  let denominator = (reserve1 - amount1_out) * fee;
  let amount0_in = numerator / denominator;
  let fee_amount = amount0_in * (1.0 - fee);
  // only the post-fee amount is added back, symmetric with amount1_in_for_amount0_out
  let new_reserve0 = reserve0 + (amount0_in - fee_amount);
  let new_reserve1 = reserve1 - amount1_out;
  Ok(SwapIn {
    amount_in: amount0_in,
    fee_amount,
    new_reserve0,
    new_reserve1,
    price_before: price(reserve0, reserve1),
    price_after: price(new_reserve0, new_reserve1),
  })
}

/// Project reserves to a target price, preserving `k = reserve0 * reserve1`.
/// Used only for projections (solvency checks, forced-liquidation
/// simulation); never written back to live pool state.
pub fn reserves_at_price(target_price: f64, reserve0: f64, reserve1: f64) -> (f64, f64) {
  let k = reserve0 * reserve1;
  let new_reserve0 = (k / target_price).sqrt();
  let new_reserve1 = (k * target_price).sqrt();
  (new_reserve0, new_reserve1)
}

#[cfg(test)]
mod tests {
  use super::*;

  const EPSILON: f64 = 1e-6;

  fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
  }

  #[test]
  fn price_is_reserve1_over_reserve0() {
    assert!(approx(price(1_000_000.0, 100_000.0), 0.1));
  }

  #[test]
  fn r1_reserves_at_price_round_trips() {
    let (r0, r1) = (1_000_000.0, 100_000.0);
    let p = price(r0, r1);
    let (r0p, r1p) = reserves_at_price(p, r0, r1);
    assert!(approx(r0p, r0));
    assert!(approx(r1p, r1));
  }

  #[test]
  fn p8_k_grows_with_fee() {
    let (r0, r1) = (1_000_000.0, 100_000.0);
    let k_before = r0 * r1;
    let out = swap1_for_0(1000.0, r0, r1, 0.997).unwrap();
    let k_after = out.new_reserve0 * out.new_reserve1;
    assert!(k_after >= k_before);
  }

  #[test]
  fn s1_spot_buy_matches_worked_example() {
    let (r0, r1) = (1_000_000.0, 100_000.0);
    let out = swap1_for_0(1000.0, r0, r1, 0.997).unwrap();
    assert!(approx(out.fee_amount, 3.0));
    assert!(out.price_after > out.price_before);
  }

  #[test]
  fn inverse_swap_rejects_when_output_exceeds_reserve() {
    let (r0, r1) = (1_000_000.0, 100_000.0);
    assert!(amount1_in_for_amount0_out(r0, r0, r1, 0.997).is_err());
    assert!(amount0_in_for_amount1_out(r1, r0, r1, 0.997).is_err());
  }

  #[test]
  fn forward_and_inverse_swap_agree() {
    let (r0, r1) = (1_000_000.0, 100_000.0);
    let fwd = swap1_for_0(1000.0, r0, r1, 0.997).unwrap();
    let inv = amount1_in_for_amount0_out(fwd.amount_out, r0, r1, 0.997).unwrap();
    assert!(approx(inv.amount_in, 1000.0));
  }
}
