//! Exercises a full open -> partial-close -> full-close lifecycle against
//! an in-memory ledger, end to end through the `Hub` facade (not `Pool`
//! directly), the way a real caller would drive the engine.

use spinpet_engine::{Factory, Ledger, PoolConfig, PoolParams};

fn seed_ledger() -> Ledger {
  let mut ledger = Ledger::new();
  ledger.create_erc20("usdt".into(), &"owner".to_string(), "USDT", "USDT", 6, 10_000_000.0);
  ledger
}

#[tokio::test]
async fn short_order_opens_partially_closes_then_fully_closes() {
  let mut ledger = seed_ledger();
  let mut factory = Factory::new();
  let hub = factory
    .create_pool(
      &mut ledger,
      &"owner".to_string(),
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
    .unwrap();

  hub
    .with_ledger_mut(|l| l.transfer("usdt", &"owner".to_string(), &"alice".to_string(), 50_000.0))
    .await
    .unwrap();

  let price = hub.get_price().await;
  // Large enough relative to reserves that a full close alone would move the
  // price past `force_move_rate`, which is what makes a partial close admissible.
  let (order_id, _) = hub
    .open_short(&"alice".to_string(), 2_000.0, 51_000.0, price * 1.2, None)
    .await
    .unwrap();

  let order = hub.get_order_by_id(&order_id).await.unwrap();
  let lend_amount0 = order.lend_amount0.unwrap();

  // partial close: most (not all) of the borrowed principal, clearing the
  // force_move_slack floor without fully closing the order.
  hub.close_short(&"alice".to_string(), &order_id, lend_amount0 * 0.65, false).await.unwrap();
  let shrunk = hub.get_order_by_id(&order_id).await.unwrap();
  assert!(shrunk.lend_amount0.unwrap() < lend_amount0);
  assert!(shrunk.high_price > shrunk.low_price);

  // full close of what remains
  let remaining = shrunk.lend_amount0.unwrap();
  hub.close_short(&"alice".to_string(), &order_id, remaining, false).await.unwrap();
  assert!(hub.get_order_by_id(&order_id).await.is_none());

  let history = hub.get_address_history_orders("alice").await;
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].order.order_id, order_id);
}

#[tokio::test]
async fn long_order_opens_and_fully_closes() {
  let mut ledger = seed_ledger();
  let mut factory = Factory::new();
  let hub = factory
    .create_pool(
      &mut ledger,
      &"owner".to_string(),
      "0xpool2".to_string(),
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
    .unwrap();

  hub
    .with_ledger_mut(|l| l.transfer("usdt", &"owner".to_string(), &"bob".to_string(), 50_000.0))
    .await
    .unwrap();

  let price = hub.get_price().await;
  let (order_id, _) = hub.open_long(&"bob".to_string(), 500.0, 1_000.0, price * 0.8, None).await.unwrap();

  let order = hub.get_order_by_id(&order_id).await.unwrap();
  let buy_amount0 = order.buy_amount0.unwrap();

  hub.close_long(&"bob".to_string(), &order_id, buy_amount0, false).await.unwrap();
  assert!(hub.get_order_by_id(&order_id).await.is_none());
  assert_eq!(hub.get_address_history_orders("bob").await.len(), 1);
}
