//! Mints a pool's `token0` supply, seeds the ledger, and wraps the freshly
//! constructed [`Pool`] in a [`Hub`].

use crate::config::PoolConfig;
use crate::error::{EngineError, EngineResult};
use crate::hub::Hub;
use crate::ledger::Ledger;
use crate::pool::Pool;
use crate::types::Address;

#[derive(Debug, Clone)]
pub struct PoolParams {
  pub name: String,
  pub symbol: String,
  pub decimals: u8,
  pub token0_total_supply: f64,
  pub token0_short_supply: f64,
  pub token1: Address,
  pub token1_amount: f64,
  pub loan_reserve1: f64,
  pub fee_address: Address,
}

#[derive(Default)]
pub struct Factory {
  pools: std::collections::HashMap<Address, Hub>,
}

impl Factory {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mint `params.token0_total_supply` of a new token0 contract to `owner`,
  /// transfer the full supply into a freshly generated pool address, and
  /// construct the [`Pool`]/[`Hub`] pair backing it. The pool takes its own
  /// copy of `ledger` at creation time; all token movement for that pool
  /// after this call goes through the returned `Hub` (`ledger_balance_of`,
  /// `with_ledger_mut`), not the caller's original handle.
  pub fn create_pool(&mut self, ledger: &mut Ledger, owner: &Address, pool_address: Address, config: PoolConfig, params: PoolParams) -> EngineResult<Hub> {
    let token0 = ledger.create_erc20(
      format!("token0-{pool_address}"),
      owner,
      params.name,
      params.symbol,
      params.decimals,
      params.token0_total_supply,
    );

    ledger
      .transfer(&token0, owner, &pool_address, params.token0_total_supply)
      .map_err(|e| EngineError::Ledger(format!("seeding pool with token0 failed: {e}")))?;

    let pool = Pool::new(
      token0,
      params.token1,
      pool_address.clone(),
      params.fee_address,
      params.token0_total_supply,
      params.token0_short_supply,
      params.token1_amount,
      params.token0_short_supply,
      params.loan_reserve1,
      ledger.clone(),
      config,
    );

    let hub = Hub::new(pool);
    self.pools.insert(pool_address, hub.clone());
    Ok(hub)
  }

  pub fn get_pool(&self, pool_address: &str) -> Option<Hub> {
    self.pools.get(pool_address).cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn create_pool_seeds_reserve0_with_full_token0_supply() {
    let mut factory = Factory::new();
    let mut ledger = Ledger::new();
    ledger.create_erc20("usdt".into(), &"owner".to_string(), "USDT", "USDT", 6, 10_000_000.0);

    let hub = factory
      .create_pool(
        &mut ledger,
        &"owner".to_string(),
        "0xpool".to_string(),
        PoolConfig::default(),
        PoolParams {
          name: "TestToken".into(),
          symbol: "TTK".into(),
          decimals: 18,
          token0_total_supply: 1_000_000.0,
          token0_short_supply: 500_000.0,
          token1: "usdt".into(),
          token1_amount: 100_000.0,
          loan_reserve1: 100_000.0,
          fee_address: "0xFeeAddress".into(),
        },
      )
      .unwrap();

    let (reserve0, reserve1) = hub.get_reserves().await;
    assert_eq!(reserve0, 500_000.0);
    assert_eq!(reserve1, 100_000.0);
    assert!(factory.get_pool("0xpool").is_some());
  }
}
