//! In-process mock token ledger. A single `Ledger` can host many token
//! contracts, each a flat `Address -> f64` balance map plus a running
//! `total_supply`.
//!
//! Every public method takes the sender explicitly rather than mutating a
//! "current caller" field first — the Hub's single mutex already serializes
//! every call, so a separate implicit-caller slot would just be a second way
//! to express the same thing, with the added risk of going stale.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::types::Address;

#[derive(Debug, Clone)]
pub struct TokenInfo {
  pub name: String,
  pub symbol: String,
  pub decimals: u8,
  pub total_supply: f64,
  balances: HashMap<Address, f64>,
}

#[derive(Debug, Default, Clone)]
pub struct Ledger {
  tokens: HashMap<Address, TokenInfo>,
}

impl Ledger {
  pub fn new() -> Self {
    Self::default()
  }

  /// Mint a new token contract with its full supply credited to `address`.
  /// Returns the freshly minted contract address.
  pub fn create_erc20(
    &mut self,
    contract_address: Address,
    address: &Address,
    name: impl Into<String>,
    symbol: impl Into<String>,
    decimals: u8,
    total_supply: f64,
  ) -> Address {
    let mut balances = HashMap::new();
    balances.insert(address.clone(), total_supply);
    self.tokens.insert(
      contract_address.clone(),
      TokenInfo {
        name: name.into(),
        symbol: symbol.into(),
        decimals,
        total_supply,
        balances,
      },
    );
    contract_address
  }

  pub fn name(&self, contract_address: &str) -> Option<&str> {
    self.tokens.get(contract_address).map(|t| t.name.as_str())
  }

  pub fn symbol(&self, contract_address: &str) -> Option<&str> {
    self.tokens.get(contract_address).map(|t| t.symbol.as_str())
  }

  pub fn decimals(&self, contract_address: &str) -> Option<u8> {
    self.tokens.get(contract_address).map(|t| t.decimals)
  }

  pub fn total_supply(&self, contract_address: &str) -> Option<f64> {
    self.tokens.get(contract_address).map(|t| t.total_supply)
  }

  pub fn balance_of(&self, contract_address: &str, owner: &str) -> f64 {
    self
      .tokens
      .get(contract_address)
      .and_then(|t| t.balances.get(owner))
      .copied()
      .unwrap_or(0.0)
  }

  /// Move `value` of `contract_address` from `from` to `to`. Fails closed:
  /// on insufficient balance nothing is mutated.
  pub fn transfer(&mut self, contract_address: &str, from: &Address, to: &Address, value: f64) -> EngineResult<()> {
    let token = self
      .tokens
      .get_mut(contract_address)
      .ok_or_else(|| EngineError::Ledger(format!("unknown token contract {contract_address}")))?;

    let from_balance = token.balances.get(from).copied().unwrap_or(0.0);
    if from_balance < value {
      return Err(EngineError::Ledger("insufficient balance".into()));
    }

    token.balances.entry(to.clone()).or_insert(0.0);
    *token.balances.get_mut(from).unwrap() -= value;
    *token.balances.get_mut(to).unwrap() += value;
    Ok(())
  }

  pub fn all_balance_of(&self, owner: &str) -> HashMap<Address, f64> {
    self
      .tokens
      .iter()
      .filter_map(|(contract, token)| {
        let balance = token.balances.get(owner).copied().unwrap_or(0.0);
        if balance > 0.0 {
          Some((contract.clone(), balance))
        } else {
          None
        }
      })
      .collect()
  }

  /// Credit every `(address, amount)` pair and grow `total_supply` by the
  /// same amount, atomically within the same call.
  pub fn airdrop(&mut self, contract_address: &str, recipients: &[(Address, f64)]) -> EngineResult<()> {
    let token = self
      .tokens
      .get_mut(contract_address)
      .ok_or_else(|| EngineError::Ledger(format!("unknown token contract {contract_address}")))?;

    for (address, amount) in recipients {
      *token.balances.entry(address.clone()).or_insert(0.0) += amount;
      token.total_supply += amount;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mint_credits_full_supply_to_creator() {
    let mut ledger = Ledger::new();
    let creator = "alice".to_string();
    ledger.create_erc20("0xtoken".into(), &creator, "Test", "TST", 18, 1_000_000.0);
    assert_eq!(ledger.balance_of("0xtoken", &creator), 1_000_000.0);
    assert_eq!(ledger.total_supply("0xtoken"), Some(1_000_000.0));
  }

  #[test]
  fn transfer_moves_balance_both_ways() {
    let mut ledger = Ledger::new();
    let alice = "alice".to_string();
    let bob = "bob".to_string();
    ledger.create_erc20("0xtoken".into(), &alice, "Test", "TST", 18, 1_000.0);
    ledger.transfer("0xtoken", &alice, &bob, 400.0).unwrap();
    assert_eq!(ledger.balance_of("0xtoken", &alice), 600.0);
    assert_eq!(ledger.balance_of("0xtoken", &bob), 400.0);
  }

  #[test]
  fn transfer_fails_closed_on_insufficient_balance() {
    let mut ledger = Ledger::new();
    let alice = "alice".to_string();
    let bob = "bob".to_string();
    ledger.create_erc20("0xtoken".into(), &alice, "Test", "TST", 18, 100.0);
    let result = ledger.transfer("0xtoken", &alice, &bob, 500.0);
    assert!(result.is_err());
    assert_eq!(ledger.balance_of("0xtoken", &alice), 100.0);
    assert_eq!(ledger.balance_of("0xtoken", &bob), 0.0);
  }

  #[test]
  fn airdrop_grows_total_supply_with_balances() {
    let mut ledger = Ledger::new();
    let alice = "alice".to_string();
    ledger.create_erc20("0xtoken".into(), &alice, "Test", "TST", 18, 1_000.0);
    ledger
      .airdrop("0xtoken", &[("bob".to_string(), 50.0), ("carol".to_string(), 25.0)])
      .unwrap();
    assert_eq!(ledger.balance_of("0xtoken", "bob"), 50.0);
    assert_eq!(ledger.balance_of("0xtoken", "carol"), 25.0);
    assert_eq!(ledger.total_supply("0xtoken"), Some(1_075.0));
  }
}
