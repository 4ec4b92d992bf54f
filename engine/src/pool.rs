//! The trading/liquidation state machine. A `Pool` owns its reserves, loan
//! reserves, order book and ledger; every public operation either fully
//! commits or leaves every one of those untouched.
//!
//! Every fallible step is computed into a local binding before any `&mut
//! self` write happens, and ledger transfers are attempted last — so a
//! `Result::Err` anywhere means nothing was mutated.

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::PoolConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;
use crate::order_book::OrderBook;
use crate::swap_math;
use crate::types::{Address, CloseType, ClosedOrder, Order, OrderId, OrderType};

#[derive(Debug, Clone)]
pub struct OpOutcome {
  pub message: String,
}

impl OpOutcome {
  fn new(message: impl Into<String>) -> Self {
    Self { message: message.into() }
  }
}

/// A consistent snapshot of every settable field of a pool, for display or
/// external bookkeeping. Not used internally; `Pool` reads its own fields
/// directly everywhere else.
#[derive(Debug, Clone, Serialize)]
pub struct PoolInfo {
  pub token0: Address,
  pub token1: Address,
  pub pool_address: Address,
  pub fee_address: Address,
  pub token0_total_supply: f64,
  pub token0_short_supply: f64,
  pub reserve0: f64,
  pub reserve1: f64,
  pub loan_reserve0: f64,
  pub loan_reserve1: f64,
  pub collateral_short_amount1: f64,
  pub collateral_long_amount1: f64,
  pub config: PoolConfig,
}

impl PoolInfo {
  /// Render as the JSON payload `spec.md` §6's `getInfo() -> JSON` calls
  /// for. Serialization of a derived `Serialize` struct cannot fail.
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).expect("PoolInfo serialization is infallible")
  }
}

pub struct Pool {
  pub token0: Address,
  pub token1: Address,
  pub pool_address: Address,
  pub fee_address: Address,

  pub token0_total_supply: f64,
  pub token0_short_supply: f64,

  pub reserve0: f64,
  pub reserve1: f64,

  pub loan_reserve0: f64,
  pub loan_reserve1: f64,

  pub collateral_short_amount1: f64,
  pub collateral_long_amount1: f64,

  pub config: PoolConfig,

  ledger: Ledger,
  book: OrderBook,
}

impl Pool {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    token0: Address,
    token1: Address,
    pool_address: Address,
    fee_address: Address,
    token0_total_supply: f64,
    token0_short_supply: f64,
    reserve1: f64,
    loan_reserve0: f64,
    loan_reserve1: f64,
    ledger: Ledger,
    config: PoolConfig,
  ) -> Self {
    let reserve0 = token0_total_supply - token0_short_supply;
    Self {
      token0,
      token1,
      pool_address,
      fee_address,
      token0_total_supply,
      token0_short_supply,
      reserve0,
      reserve1,
      loan_reserve0,
      loan_reserve1,
      collateral_short_amount1: 0.0,
      collateral_long_amount1: 0.0,
      ledger,
      book: OrderBook::new(config.order_max_length),
      config,
    }
  }

  pub fn ledger(&self) -> &Ledger {
    &self.ledger
  }

  pub fn ledger_mut(&mut self) -> &mut Ledger {
    &mut self.ledger
  }

  pub fn book(&self) -> &OrderBook {
    &self.book
  }

  pub fn reserves(&self) -> (f64, f64) {
    (self.reserve0, self.reserve1)
  }

  pub fn price(&self) -> f64 {
    swap_math::price(self.reserve0, self.reserve1)
  }

  pub fn get_info(&self) -> PoolInfo {
    PoolInfo {
      token0: self.token0.clone(),
      token1: self.token1.clone(),
      pool_address: self.pool_address.clone(),
      fee_address: self.fee_address.clone(),
      token0_total_supply: self.token0_total_supply,
      token0_short_supply: self.token0_short_supply,
      reserve0: self.reserve0,
      reserve1: self.reserve1,
      loan_reserve0: self.loan_reserve0,
      loan_reserve1: self.loan_reserve1,
      collateral_short_amount1: self.collateral_short_amount1,
      collateral_long_amount1: self.collateral_long_amount1,
      config: self.config,
    }
  }

  pub fn get_order_by_id(&self, id: &str) -> Option<&Order> {
    self.book.get_order_by_id(id)
  }

  pub fn get_orders_by_address(&self, address: &str) -> Vec<&Order> {
    self.book.get_orders_by_address(address)
  }

  pub fn get_address_history(&self, address: &str) -> &[ClosedOrder] {
    self.book.get_address_history_orders(address)
  }

  fn now(&self) -> i64 {
    common::Time::now().to_unix()
  }

  // --------------------------------------------------------------- buy/sell

  /// Buy `amount1` worth of token1 into token0.
  pub fn buy(&mut self, caller: &Address, amount1: f64) -> EngineResult<OpOutcome> {
    debug!("buy: price before = {}", self.price());

    let caller_balance = self.ledger.balance_of(&self.token1, caller);
    if caller_balance < amount1 {
      return Err(EngineError::Precondition("insufficient USDT balance".into()));
    }

    let out = swap_math::swap1_for_0(amount1, self.reserve0, self.reserve1, self.config.fee)?;
    let price_change_rate = (out.price_after - out.price_before) / out.price_before;
    if price_change_rate > self.config.force_move_rate {
      return Err(EngineError::Policy(format!(
        "price movement {:.3}% exceeds maximum single trade volatility {:.3}%",
        price_change_rate * 100.0,
        self.config.force_move_rate * 100.0
      )));
    }

    if !self.book.check_short_order_range(out.price_after, out.price_before, None) {
      return Err(EngineError::Book(
        "intersects with short liquidation, please liquidate first".into(),
      ));
    }

    self.reserve0 = out.new_reserve0;
    self.reserve1 = out.new_reserve1;

    self.ledger.transfer(&self.token0, &self.pool_address, caller, out.amount_out)?;
    self.ledger.transfer(&self.token1, caller, &self.pool_address, amount1)?;
    self.ledger.transfer(&self.token1, &self.pool_address, &self.fee_address, out.fee_amount)?;

    info!("buy: {amount1} token1 -> {} token0, fee {}, price now {}", out.amount_out, out.fee_amount, self.price());
    Ok(OpOutcome::new("buy operation successful"))
  }

  /// Sell `amount0` of token0 into token1.
  pub fn sell(&mut self, caller: &Address, amount0: f64) -> EngineResult<OpOutcome> {
    debug!("sell: price before = {}", self.price());

    let caller_balance = self.ledger.balance_of(&self.token0, caller);
    if caller_balance < amount0 {
      return Err(EngineError::Precondition("insufficient token balance".into()));
    }

    let out = swap_math::swap0_for_1(amount0, self.reserve0, self.reserve1, self.config.fee)?;
    let price_change_rate = (out.price_before - out.price_after) / out.price_before;
    if price_change_rate > self.config.force_move_rate {
      return Err(EngineError::Policy(format!(
        "price movement {:.3}% exceeds maximum single trade volatility {:.3}%",
        price_change_rate * 100.0,
        self.config.force_move_rate * 100.0
      )));
    }

    if !self.book.check_long_order_range(out.price_before, out.price_after, None) {
      return Err(EngineError::Book(
        "intersects with long liquidation, please liquidate first".into(),
      ));
    }

    self.reserve0 = out.new_reserve0;
    self.reserve1 = out.new_reserve1;

    self.ledger.transfer(&self.token0, &self.pool_address, &self.fee_address, out.fee_amount)?;
    self.ledger.transfer(&self.token1, &self.pool_address, caller, out.amount_out)?;
    self.ledger.transfer(&self.token0, caller, &self.pool_address, amount0)?;

    info!("sell: {amount0} token0 -> {} token1, fee {}, price now {}", out.amount_out, out.fee_amount, self.price());
    Ok(OpOutcome::new("sell operation successful"))
  }

  // ------------------------------------------------------------------ short

  #[allow(clippy::too_many_arguments)]
  pub fn open_short(
    &mut self,
    caller: &Address,
    base_amount1: f64,
    lend_amount0: f64,
    forced_close_price: f64,
    insert_after_id: Option<&str>,
  ) -> EngineResult<(OrderId, OpOutcome)> {
    let current_price = self.price();
    if forced_close_price <= current_price {
      return Err(EngineError::Precondition(
        "forced liquidation price cannot be less than current price".into(),
      ));
    }

    let caller_balance = self.ledger.balance_of(&self.token1, caller);
    if caller_balance < base_amount1 {
      return Err(EngineError::Precondition("insufficient wallet balance".into()));
    }

    if self.loan_reserve0 < lend_amount0 {
      return Err(EngineError::Precondition("insufficient tokens in loan pool".into()));
    }

    // simulate selling the borrowed principal to price this order
    let sell = swap_math::swap0_for_1(lend_amount0, self.reserve0, self.reserve1, self.config.fee)?;
    let price_change_rate = (sell.price_before - sell.price_after) / sell.price_before;
    if price_change_rate > self.config.force_move_rate {
      return Err(EngineError::Policy(format!(
        "price movement {:.3}% exceeds maximum single trade volatility {:.3}%",
        price_change_rate * 100.0,
        self.config.force_move_rate * 100.0
      )));
    }

    if !self.book.check_long_order_range(sell.price_before, sell.price_after, None) {
      return Err(EngineError::Book(
        "intersects with long liquidation, please liquidate first".into(),
      ));
    }

    let sell_amount1 = sell.amount_out;
    let loan_fee = sell_amount1 * (1.0 - self.config.loan_fee);
    let loan_day_fee = sell_amount1 * (1.0 - self.config.loan_day_fee);
    let forced_close_fee = sell_amount1 * (1.0 - self.config.forced_close_fee);
    let third_fee = forced_close_fee + self.config.forced_close_base_amount;
    let total_fees = loan_fee + loan_day_fee + third_fee;

    let (forced_reserve0, forced_reserve1) = swap_math::reserves_at_price(forced_close_price, self.reserve0, self.reserve1);
    let forced = swap_math::amount1_in_for_amount0_out(lend_amount0, forced_reserve0, forced_reserve1, self.config.fee)?;

    if forced.amount_in + total_fees >= sell_amount1 + base_amount1 {
      return Err(EngineError::Solvency("will lose money after liquidation".into()));
    }

    let order_id = self.book.generate_order_id("short");
    let order = Order {
      order_id: order_id.clone(),
      order_type: OrderType::Short,
      address: caller.clone(),
      open_price: current_price,
      forced_close_price,
      low_price: forced.price_before,
      high_price: forced.price_after,
      base_amount1,
      lend_amount0: Some(lend_amount0),
      sell_amount1: Some(sell_amount1),
      lend_amount1: None,
      buy_amount0: None,
      loan_fee,
      loan_day_fee,
      third_fee,
      loan_time: self.now(),
      high_node: None,
      low_node: None,
    };

    self.book.insert_short_order(order, insert_after_id)?;

    self.loan_reserve0 -= lend_amount0;
    self.reserve0 = sell.new_reserve0;
    self.reserve1 = sell.new_reserve1;

    self.ledger.transfer(&self.token1, caller, &self.pool_address, base_amount1)?;
    self.ledger.transfer(&self.token0, &self.pool_address, &self.fee_address, sell.fee_amount)?;

    self.collateral_short_amount1 += base_amount1 + sell_amount1;

    info!(
      "open_short: order {order_id}, borrowed {lend_amount0} token0, liquidation at {forced_close_price}, loan pool now {}",
      self.loan_reserve0
    );
    Ok((order_id, OpOutcome::new("short operation successful")))
  }

  pub fn close_short(&mut self, caller: &Address, order_id: &str, close_amount0: f64, is_third_party: bool) -> EngineResult<OpOutcome> {
    if close_amount0 == 0.0 {
      return Err(EngineError::Precondition("liquidation amount cannot be 0".into()));
    }

    let order = self
      .book
      .get_order_by_id(order_id)
      .ok_or_else(|| EngineError::Book("order id does not exist".into()))?
      .clone();

    if order.order_type != OrderType::Short {
      return Err(EngineError::Precondition("order type is not short".into()));
    }

    if is_third_party {
      let current_price = self.price();
      let current_time = self.now();
      let threshold_price = order.forced_close_price * (1.0 - self.config.force_move_rate);
      let time_exceeded = (current_time - order.loan_time) > self.config.lending_second_limit;
      if current_price < threshold_price && !time_exceeded {
        return Err(EngineError::ThirdPartyGate(
          "liquidation price conditions not met and lending time not exceeded".into(),
        ));
      }
    } else if order.address != *caller {
      return Err(EngineError::Precondition("order address does not match current address".into()));
    }

    let lend_amount0 = order.lend_amount0.expect("short order always carries lend_amount0");
    if lend_amount0 < close_amount0 {
      return Err(EngineError::Precondition("liquidation amount cannot exceed borrowed token amount".into()));
    }

    let is_partial = close_amount0 != lend_amount0;
    if is_partial {
      let full_check = swap_math::amount1_in_for_amount0_out(lend_amount0, self.reserve0, self.reserve1, self.config.fee)?;
      let full_rate = (full_check.price_after - full_check.price_before) / full_check.price_before;
      if full_rate <= self.config.force_move_rate {
        return Err(EngineError::Policy(format!(
          "full liquidation price movement {:.3}% does not exceed maximum single trade volatility {:.3}%, this order cannot be partially liquidated",
          full_rate * 100.0,
          self.config.force_move_rate * 100.0
        )));
      }

      let partial_check = swap_math::amount1_in_for_amount0_out(close_amount0, self.reserve0, self.reserve1, self.config.fee)?;
      let partial_rate = (partial_check.price_after - partial_check.price_before) / partial_check.price_before;
      if partial_rate < self.config.force_move_slack {
        return Err(EngineError::Policy(format!(
          "partial liquidation range cannot be too small {:.3}% does not meet partial liquidation requirement {:.3}%",
          partial_rate * 100.0,
          self.config.force_move_slack * 100.0
        )));
      }
    }

    let close_rate = close_amount0 / lend_amount0;
    let close_base_amount = order.base_amount1 * close_rate;
    let close_sell_amount1 = order.sell_amount1.unwrap_or(0.0) * close_rate;
    let close_loan_fee = order.loan_fee * close_rate;
    let close_loan_day_fee = order.loan_day_fee * close_rate;
    let close_third_fee = if is_third_party { order.third_fee * close_rate } else { 0.0 };

    let repurchase = swap_math::amount1_in_for_amount0_out(close_amount0, self.reserve0, self.reserve1, self.config.fee)?;

    if is_partial {
      let rate = (repurchase.price_after - repurchase.price_before) / repurchase.price_before;
      if rate < self.config.force_move_slack {
        return Err(EngineError::Policy(format!(
          "partial liquidation range cannot be too small {:.3}% does not meet partial liquidation requirement {:.3}%",
          rate * 100.0,
          self.config.force_move_slack * 100.0
        )));
      }
    }

    if !self.book.check_short_order_range(repurchase.price_after, repurchase.price_before, Some(order_id)) {
      return Err(EngineError::Book("intersects with short liquidation, please liquidate first".into()));
    }

    self.reserve0 = repurchase.new_reserve0;
    self.reserve1 = repurchase.new_reserve1;

    let close_amount1 = (close_base_amount + close_sell_amount1) - repurchase.amount_in;
    let loan_fee_amount = close_loan_fee + close_loan_day_fee;
    let refund_amount = close_amount1 - loan_fee_amount - close_third_fee;
    let all_fee_amount1 = repurchase.fee_amount + loan_fee_amount;

    self.ledger.transfer(&self.token1, &self.pool_address, &self.fee_address, all_fee_amount1)?;

    self.loan_reserve0 += close_amount0;

    self.ledger.transfer(&self.token1, &self.pool_address, &order.address, refund_amount)?;
    if is_third_party {
      self.ledger.transfer(&self.token1, &self.pool_address, caller, close_third_fee)?;
    }

    if !is_partial {
      let closed = ClosedOrder {
        order: order.clone(),
        close_price: self.price(),
        close_timestamp: self.now(),
        close_type: if is_third_party { CloseType::ThirdParty } else { CloseType::User },
        profit_loss: refund_amount - order.base_amount1,
        pct_loss: (refund_amount - order.base_amount1) / order.base_amount1,
      };
      self.book.archive_short_order(order_id, closed)?;
    } else {
      let (forced_reserve0, forced_reserve1) =
        swap_math::reserves_at_price(order.forced_close_price, self.reserve0, self.reserve1);
      let new_lend_amount0 = lend_amount0 - close_amount0;
      let forced = swap_math::amount1_in_for_amount0_out(new_lend_amount0, forced_reserve0, forced_reserve1, self.config.fee)?;
      self.book.update_order_by_id(order_id, |o| {
        o.base_amount1 -= close_base_amount;
        o.sell_amount1 = o.sell_amount1.map(|v| v - close_sell_amount1);
        o.third_fee -= close_third_fee;
        o.loan_fee -= close_loan_fee;
        o.loan_day_fee -= close_loan_day_fee;
        o.lend_amount0 = Some(new_lend_amount0);
        o.high_price = forced.price_after;
        o.low_price = forced.price_before;
      })?;
    }

    warn!("close_short: order {order_id} closed {close_amount0} of {lend_amount0}, refund {refund_amount}");
    Ok(OpOutcome::new("liquidation successful"))
  }

  // ------------------------------------------------------------------- long

  #[allow(clippy::too_many_arguments)]
  pub fn open_long(
    &mut self,
    caller: &Address,
    base_amount1: f64,
    lend_amount1: f64,
    forced_close_price: f64,
    insert_after_id: Option<&str>,
  ) -> EngineResult<(OrderId, OpOutcome)> {
    let current_price = self.price();
    if forced_close_price >= current_price {
      return Err(EngineError::Precondition(
        "forced liquidation price cannot be greater than current price".into(),
      ));
    }
    if forced_close_price <= 0.0 {
      return Err(EngineError::Precondition("forced liquidation price cannot equal 0".into()));
    }

    let caller_balance = self.ledger.balance_of(&self.token1, caller);
    if caller_balance < base_amount1 {
      return Err(EngineError::Precondition("insufficient wallet balance".into()));
    }

    if self.loan_reserve1 < lend_amount1 {
      return Err(EngineError::Precondition("insufficient base tokens in loan pool".into()));
    }

    let total_base_amount = base_amount1 + lend_amount1;

    let loan_fee = lend_amount1 * (1.0 - self.config.loan_fee);
    let loan_day_fee = lend_amount1 * (1.0 - self.config.loan_day_fee);
    let forced_close_fee = lend_amount1 * (1.0 - self.config.forced_close_fee);
    let third_fee = forced_close_fee + self.config.forced_close_base_amount;
    let total_fees = loan_fee + loan_day_fee + third_fee;

    let buy = swap_math::swap1_for_0(total_base_amount, self.reserve0, self.reserve1, self.config.fee)?;
    let price_change_rate = (buy.price_after - buy.price_before) / buy.price_before;
    if price_change_rate > self.config.force_move_rate {
      return Err(EngineError::Policy(format!(
        "price movement {:.3}% exceeds maximum single trade volatility {:.3}%",
        price_change_rate * 100.0,
        self.config.force_move_rate * 100.0
      )));
    }

    if !self.book.check_short_order_range(buy.price_after, buy.price_before, None) {
      return Err(EngineError::Book("intersects with short liquidation, please liquidate first".into()));
    }

    let buy_amount0 = buy.amount_out;

    let (forced_reserve0, forced_reserve1) = swap_math::reserves_at_price(forced_close_price, self.reserve0, self.reserve1);
    let forced = swap_math::swap0_for_1(buy_amount0, forced_reserve0, forced_reserve1, self.config.fee)?;

    // This is the authoritative solvency check: a single comparison against
    // the simulated forced-sale proceeds. The Hub's advisory fast-open
    // solver uses a doubled form of this term for historical reasons (see
    // `hub.rs`); it doesn't matter because every candidate it produces is
    // re-validated here regardless.
    if forced.amount_out < lend_amount1 + total_fees {
      return Err(EngineError::Solvency("will lose money after liquidation".into()));
    }

    let order_id = self.book.generate_order_id("long");
    let order = Order {
      order_id: order_id.clone(),
      order_type: OrderType::Long,
      address: caller.clone(),
      open_price: current_price,
      forced_close_price,
      low_price: forced.price_after,
      high_price: forced.price_before,
      base_amount1,
      lend_amount0: None,
      sell_amount1: None,
      lend_amount1: Some(lend_amount1),
      buy_amount0: Some(buy_amount0),
      loan_fee,
      loan_day_fee,
      third_fee,
      loan_time: self.now(),
      high_node: None,
      low_node: None,
    };

    self.book.insert_long_order(order, insert_after_id)?;

    self.loan_reserve1 -= lend_amount1;
    self.reserve0 = buy.new_reserve0;
    self.reserve1 = buy.new_reserve1;

    self.ledger.transfer(&self.token1, caller, &self.pool_address, base_amount1)?;
    self.ledger.transfer(&self.token1, &self.pool_address, &self.fee_address, buy.fee_amount)?;

    self.collateral_long_amount1 += base_amount1;

    info!(
      "open_long: order {order_id}, borrowed {lend_amount1} token1, liquidation at {forced_close_price}, loan pool now {}",
      self.loan_reserve1
    );
    Ok((order_id, OpOutcome::new("long operation successful")))
  }

  pub fn close_long(&mut self, caller: &Address, order_id: &str, close_amount0: f64, is_third_party: bool) -> EngineResult<OpOutcome> {
    if close_amount0 == 0.0 {
      return Err(EngineError::Precondition("liquidation amount cannot be 0".into()));
    }

    let order = self
      .book
      .get_order_by_id(order_id)
      .ok_or_else(|| EngineError::Book("order id does not exist".into()))?
      .clone();

    if order.order_type != OrderType::Long {
      return Err(EngineError::Precondition("order type is not long".into()));
    }

    if is_third_party {
      let current_price = self.price();
      let current_time = self.now();
      let threshold_price = order.forced_close_price * (1.0 + self.config.force_move_rate);
      let time_exceeded = (current_time - order.loan_time) > self.config.lending_second_limit;
      if current_price > threshold_price && !time_exceeded {
        return Err(EngineError::ThirdPartyGate(
          "liquidation price conditions not met and lending time not exceeded".into(),
        ));
      }
    } else if order.address != *caller {
      return Err(EngineError::Precondition("order address does not match current address".into()));
    }

    let buy_amount0 = order.buy_amount0.expect("long order always carries buy_amount0");
    if buy_amount0 < close_amount0 {
      return Err(EngineError::Precondition("liquidation amount exceeds order amount".into()));
    }

    let is_partial = close_amount0 != buy_amount0;
    if is_partial {
      let full_check = swap_math::swap0_for_1(buy_amount0, self.reserve0, self.reserve1, self.config.fee)?;
      let full_rate = (full_check.price_before - full_check.price_after) / full_check.price_before;
      if full_rate <= self.config.force_move_rate {
        return Err(EngineError::Policy(format!(
          "full liquidation price movement {:.3}% does not exceed maximum single trade volatility {:.3}%, this order cannot be partially liquidated",
          full_rate * 100.0,
          self.config.force_move_rate * 100.0
        )));
      }
    }

    let close_rate = close_amount0 / buy_amount0;
    let close_loan_fee = order.loan_fee * close_rate;
    let close_loan_day_fee = order.loan_day_fee * close_rate;
    let close_lend_amount1 = order.lend_amount1.unwrap_or(0.0) * close_rate;
    let close_third_fee = if is_third_party { order.third_fee * close_rate } else { 0.0 };

    let sale = swap_math::swap0_for_1(close_amount0, self.reserve0, self.reserve1, self.config.fee)?;

    if is_partial {
      let rate = (sale.price_before - sale.price_after) / sale.price_before;
      if rate < self.config.force_move_slack {
        return Err(EngineError::Policy(format!(
          "partial liquidation price movement {:.3}% too small, price volatility must be greater than {:.3}%",
          rate * 100.0,
          self.config.force_move_slack * 100.0
        )));
      }
    }

    if !self.book.check_long_order_range(sale.price_before, sale.price_after, Some(order_id)) {
      return Err(EngineError::Book("intersects with other long liquidations, please liquidate first".into()));
    }

    self.reserve0 = sale.new_reserve0;
    self.reserve1 = sale.new_reserve1;

    self.ledger.transfer(&self.token0, &self.pool_address, &self.fee_address, sale.fee_amount)?;

    let loan_fee_amount = close_loan_fee + close_loan_day_fee;
    let refund_amount = sale.amount_out - loan_fee_amount - close_lend_amount1 - close_third_fee;

    self.ledger.transfer(&self.token1, &self.pool_address, &self.fee_address, loan_fee_amount)?;

    self.loan_reserve1 += close_lend_amount1;

    self.ledger.transfer(&self.token1, &self.pool_address, &order.address, refund_amount)?;
    if is_third_party {
      self.ledger.transfer(&self.token1, &self.pool_address, caller, close_third_fee)?;
    }

    if !is_partial {
      let closed = ClosedOrder {
        order: order.clone(),
        close_price: self.price(),
        close_timestamp: self.now(),
        close_type: if is_third_party { CloseType::ThirdParty } else { CloseType::User },
        profit_loss: refund_amount - order.base_amount1,
        pct_loss: (refund_amount - order.base_amount1) / order.base_amount1,
      };
      self.book.archive_long_order(order_id, closed)?;
    } else {
      let new_buy_amount0 = buy_amount0 - close_amount0;
      let (forced_reserve0, forced_reserve1) =
        swap_math::reserves_at_price(order.forced_close_price, self.reserve0, self.reserve1);
      let forced = swap_math::swap0_for_1(new_buy_amount0, forced_reserve0, forced_reserve1, self.config.fee)?;
      self.book.update_order_by_id(order_id, |o| {
        o.loan_fee -= close_loan_fee;
        o.loan_day_fee -= close_loan_day_fee;
        o.lend_amount1 = Some(o.lend_amount1.unwrap_or(0.0) - close_lend_amount1);
        o.buy_amount0 = Some(new_buy_amount0);
        o.third_fee -= close_third_fee;
        o.high_price = forced.price_before;
        o.low_price = forced.price_after;
      })?;
    }

    warn!("close_long: order {order_id} closed {close_amount0} of {buy_amount0}, refund {refund_amount}");
    Ok(OpOutcome::new("liquidation successful"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn build_pool() -> Pool {
    let mut ledger = Ledger::new();
    let pool_address = "pool".to_string();
    ledger.create_erc20("token0".into(), &pool_address, "Token0", "T0", 18, 1_000_000.0);
    ledger.create_erc20("token1".into(), &pool_address, "Token1", "USDT", 6, 10_000_000.0);
    ledger.transfer("token1", &pool_address, &"alice".to_string(), 50_000.0).unwrap();

    Pool::new(
      "token0".into(),
      "token1".into(),
      pool_address,
      "fee".into(),
      1_000_000.0,
      0.0,
      100_000.0,
      200_000.0,
      100_000.0,
      ledger,
      PoolConfig::default(),
    )
  }

  #[test]
  fn get_info_snapshots_settable_fields() {
    let pool = build_pool();
    let info = pool.get_info();
    assert_eq!(info.reserve0, 1_000_000.0);
    assert_eq!(info.reserve1, 100_000.0);
    assert_eq!(info.loan_reserve0, 200_000.0);
    assert_eq!(info.config.fee, pool.config.fee);
  }

  #[test]
  fn get_info_serializes_to_json() {
    let pool = build_pool();
    let json = pool.get_info().to_json();
    assert!(json.contains("\"reserve0\":1000000"));
  }

  #[test]
  fn s1_spot_buy_moves_price_up() {
    let mut pool = build_pool();
    let before = pool.price();
    pool.buy(&"alice".to_string(), 1_000.0).unwrap();
    assert!(pool.price() > before);
  }

  #[test]
  fn buy_rejects_insufficient_balance() {
    let mut pool = build_pool();
    let result = pool.buy(&"alice".to_string(), 1_000_000.0);
    assert!(matches!(result, Err(EngineError::Precondition(_))));
  }

  #[test]
  fn open_short_rejects_price_below_current() {
    let mut pool = build_pool();
    let price = pool.price();
    let result = pool.open_short(&"alice".to_string(), 100.0, 1_000.0, price - 0.01, None);
    assert!(matches!(result, Err(EngineError::Precondition(_))));
  }

  #[test]
  fn open_short_then_close_short_round_trips() {
    let mut pool = build_pool();
    let price = pool.price();
    let (order_id, _) = pool
      .open_short(&"alice".to_string(), 500.0, 1_000.0, price * 1.2, None)
      .unwrap();
    assert!(pool.get_order_by_id(&order_id).is_some());
    pool.close_short(&"alice".to_string(), &order_id, 1_000.0, false).unwrap();
    assert!(pool.get_order_by_id(&order_id).is_none());
    assert!(!pool.get_address_history("alice").is_empty());
  }

  #[test]
  fn open_long_then_close_long_round_trips() {
    let mut pool = build_pool();
    let price = pool.price();
    let (order_id, _) = pool
      .open_long(&"alice".to_string(), 500.0, 1_000.0, price * 0.8, None)
      .unwrap();
    assert!(pool.get_order_by_id(&order_id).is_some());
    let buy_amount0 = pool.get_order_by_id(&order_id).unwrap().buy_amount0.unwrap();
    pool.close_long(&"alice".to_string(), &order_id, buy_amount0, false).unwrap();
    assert!(pool.get_order_by_id(&order_id).is_none());
  }

  #[test]
  fn close_short_rejects_wrong_caller() {
    let mut pool = build_pool();
    let price = pool.price();
    let (order_id, _) = pool
      .open_short(&"alice".to_string(), 500.0, 1_000.0, price * 1.2, None)
      .unwrap();
    let result = pool.close_short(&"bob".to_string(), &order_id, 1_000.0, false);
    assert!(matches!(result, Err(EngineError::Precondition(_))));
  }
}
