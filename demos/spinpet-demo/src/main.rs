//! Exercises the engine end to end for local experimentation: mints a pool,
//! opens a leveraged short through the fast-open solver, and prints the
//! resulting book state. Not part of the library's public surface.

use spinpet_engine::{init_logger, Factory, Ledger, PoolConfig, PoolParams};

#[tokio::main]
async fn main() {
  init_logger();

  let owner = "owner".to_string();
  let mut ledger = Ledger::new();
  ledger.create_erc20("usdt".into(), &owner, "USDT", "USDT", 6, 10_000_000.0);

  let mut factory = Factory::new();
  let hub = factory
    .create_pool(
      &mut ledger,
      &owner,
      "0xpool".to_string(),
      PoolConfig::default(),
      PoolParams {
        name: "Spinpet".into(),
        symbol: "SPT".into(),
        decimals: 18,
        token0_total_supply: 1_000_000.0,
        token0_short_supply: 0.0,
        token1: "usdt".into(),
        token1_amount: 100_000.0,
        loan_reserve1: 100_000.0,
        fee_address: "0xFeeAddress".into(),
      },
    )
    .expect("pool creation");

  hub
    .with_ledger_mut(|l| l.transfer("usdt", &owner, &"trader".to_string(), 10_000.0))
    .await
    .expect("seed trader balance");

  let hint = hub.short_fast_open(2_000.0, 3.0).await.expect("fast-open solver");
  log::info!(
    "solved short: lend_amount={} forced_close_price={} insert_after={:?}",
    hint.lend_amount,
    hint.forced_close_price,
    hint.insert_after_id
  );

  let (order_id, outcome) = hub
    .open_short(
      &"trader".to_string(),
      2_000.0,
      hint.lend_amount,
      hint.forced_close_price,
      hint.insert_after_id.as_deref(),
    )
    .await
    .expect("open_short");

  log::info!("opened {order_id}: {}", outcome.message);
  log::info!("price history: {:?}", hub.get_price_history().await);
}
