//! Two ordered doubly-linked lists of disjoint price intervals. Orders live
//! in a flat, `HashMap`-indexed arena with `Option<OrderId>` links rather
//! than heap pointers — insertion positions are supplied by the caller (the
//! fast-open solver), so the book never searches, only validates adjacency.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::types::{Address, ClosedOrder, Order, OrderId, OrderType};

/// Default used only where a book is built without an explicit policy
/// (tests); live pools always wire this from `PoolConfig::order_max_length`.
pub const ORDER_MAX_LENGTH: usize = 50;

#[derive(Debug)]
pub struct OrderBook {
  short_orders: HashMap<OrderId, Order>,
  near_short_node: Option<OrderId>,

  long_orders: HashMap<OrderId, Order>,
  near_long_node: Option<OrderId>,

  address_node_map: HashMap<Address, Vec<OrderId>>,
  address_history_map: HashMap<Address, Vec<ClosedOrder>>,

  order_count: u64,
  max_length: usize,
}

impl Default for OrderBook {
  fn default() -> Self {
    Self::new(ORDER_MAX_LENGTH)
  }
}

impl OrderBook {
  pub fn new(max_length: usize) -> Self {
    Self {
      short_orders: HashMap::new(),
      near_short_node: None,
      long_orders: HashMap::new(),
      near_long_node: None,
      address_node_map: HashMap::new(),
      address_history_map: HashMap::new(),
      order_count: 0,
      max_length,
    }
  }

  pub fn generate_order_id(&mut self, head: &str) -> OrderId {
    self.order_count += 1;
    format!("{head}{}", self.order_count)
  }

  pub fn near_short_node(&self) -> Option<&OrderId> {
    self.near_short_node.as_ref()
  }

  pub fn near_long_node(&self) -> Option<&OrderId> {
    self.near_long_node.as_ref()
  }

  pub fn get_order_by_id(&self, id: &str) -> Option<&Order> {
    self.short_orders.get(id).or_else(|| self.long_orders.get(id))
  }

  fn get_order_by_id_mut(&mut self, id: &str) -> Option<&mut Order> {
    if self.short_orders.contains_key(id) {
      self.short_orders.get_mut(id)
    } else {
      self.long_orders.get_mut(id)
    }
  }

  /// Apply `patch` to the order's mutable fields, wherever it lives. The
  /// caller is responsible for footprint recomputation and for not
  /// violating book disjointness.
  pub fn update_order_by_id(&mut self, id: &str, patch: impl FnOnce(&mut Order)) -> EngineResult<()> {
    match self.get_order_by_id_mut(id) {
      Some(order) => {
        patch(order);
        Ok(())
      }
      None => Err(EngineError::Book(format!("order id {id} not found"))),
    }
  }

  pub fn get_orders_by_address(&self, address: &str) -> Vec<&Order> {
    self
      .address_node_map
      .get(address)
      .into_iter()
      .flatten()
      .filter_map(|id| self.get_order_by_id(id))
      .collect()
  }

  pub fn get_address_history_orders(&self, address: &str) -> &[ClosedOrder] {
    self
      .address_history_map
      .get(address)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  fn add_order_to_address_map(&mut self, address: &str, order_id: OrderId) -> EngineResult<()> {
    let max_length = self.max_length;
    let entry = self.address_node_map.entry(address.to_string()).or_default();
    if entry.len() >= max_length {
      return Err(EngineError::Policy(format!(
        "address {address} has reached the maximum order limit {max_length}"
      )));
    }
    entry.push(order_id);
    Ok(())
  }

  fn remove_order_from_address_map(&mut self, address: &str, order_id: &str, closed: ClosedOrder) {
    if let Some(ids) = self.address_node_map.get_mut(address) {
      ids.retain(|id| id != order_id);
      if ids.is_empty() {
        self.address_node_map.remove(address);
      }
    }
    self.address_history_map.entry(address.to_string()).or_default().push(closed);
  }

  // ---------------------------------------------------------------- short

  /// Insert a short order. `after_id == None` inserts at the bottom of the
  /// book (closest to spot); otherwise the order is linked immediately
  /// above the named node.
  pub fn insert_short_order(&mut self, mut node: Order, after_id: Option<&str>) -> EngineResult<OrderId> {
    if node.high_price <= node.low_price {
      return Err(EngineError::Precondition(
        "highest price must be greater than lowest price".into(),
      ));
    }

    let Some(near_id) = self.near_short_node.clone() else {
      let id = node.order_id.clone();
      self.add_order_to_address_map(&node.address, id.clone())?;
      self.near_short_node = Some(id.clone());
      self.short_orders.insert(id.clone(), node);
      return Ok(id);
    };

    match after_id {
      None => {
        let lowest = self.short_orders.get(&near_id).expect("near node must exist");
        if node.high_price > lowest.low_price {
          return Err(EngineError::Book("overlaps with lowest node".into()));
        }
        let id = node.order_id.clone();
        node.high_node = Some(near_id.clone());
        self.add_order_to_address_map(&node.address, id.clone())?;
        self.short_orders.get_mut(&near_id).unwrap().low_node = Some(id.clone());
        self.near_short_node = Some(id.clone());
        self.short_orders.insert(id.clone(), node);
        Ok(id)
      }
      Some(after_id) => {
        let current = self
          .short_orders
          .get(after_id)
          .ok_or_else(|| EngineError::Book(format!("insertion anchor {after_id} does not exist")))?
          .clone();
        if node.low_price < current.high_price {
          return Err(EngineError::Book(format!("overlaps with {after_id} node")));
        }
        let id = node.order_id.clone();
        match current.high_node.clone() {
          Some(upper_id) => {
            let upper = self.short_orders.get(&upper_id).expect("linked node must exist").clone();
            if node.high_price > upper.low_price {
              return Err(EngineError::Book(format!("overlaps with {upper_id} node")));
            }
            node.high_node = Some(upper_id.clone());
            node.low_node = Some(after_id.to_string());
            self.short_orders.get_mut(after_id).unwrap().high_node = Some(id.clone());
            self.short_orders.get_mut(&upper_id).unwrap().low_node = Some(id.clone());
          }
          None => {
            node.high_node = None;
            node.low_node = Some(after_id.to_string());
            self.short_orders.get_mut(after_id).unwrap().high_node = Some(id.clone());
          }
        }
        self.add_order_to_address_map(&node.address, id.clone())?;
        self.short_orders.insert(id.clone(), node);
        Ok(id)
      }
    }
  }

  pub fn delete_short_order(&mut self, id: &str) -> EngineResult<Order> {
    let node = self
      .short_orders
      .remove(id)
      .ok_or_else(|| EngineError::Book(format!("order id {id} not found")))?;

    if let Some(upper_id) = &node.high_node {
      self.short_orders.get_mut(upper_id).unwrap().low_node = node.low_node.clone();
    }
    if let Some(lower_id) = &node.low_node {
      self.short_orders.get_mut(lower_id).unwrap().high_node = node.high_node.clone();
    } else {
      self.near_short_node = node.high_node.clone();
    }

    Ok(node)
  }

  pub fn archive_short_order(&mut self, id: &str, closed: ClosedOrder) -> EngineResult<()> {
    let address = closed.order.address.clone();
    self.delete_short_order(id)?;
    self.remove_order_from_address_map(&address, id, closed);
    Ok(())
  }

  /// True iff `[low, high]` does not overlap any open short order other
  /// than `exclude_id`. Overlap is inclusive at the endpoints (`<=`/`>=`),
  /// so a touching endpoint counts as overlap.
  pub fn check_short_order_range(&self, high: f64, low: f64, exclude_id: Option<&str>) -> bool {
    let Some(near_id) = &self.near_short_node else {
      return true;
    };
    if exclude_id == Some(near_id.as_str()) && self.short_orders.len() == 1 {
      return true;
    }

    let mut current = Some(near_id.clone());
    while let Some(id) = current {
      if Some(id.as_str()) != exclude_id {
        let node = self.short_orders.get(&id).expect("linked node must exist");
        if low <= node.high_price && high >= node.low_price {
          return false;
        }
        if high < node.low_price {
          break;
        }
      }
      current = self.short_orders.get(&id).and_then(|n| n.high_node.clone());
    }
    true
  }

  pub fn get_short_order(&self, start_id: Option<&str>, n: usize) -> Vec<&Order> {
    let mut result = Vec::new();
    let mut current = start_id.map(|s| s.to_string()).or_else(|| self.near_short_node.clone());
    while let Some(id) = current {
      if result.len() >= n {
        break;
      }
      match self.short_orders.get(&id) {
        Some(node) => {
          result.push(node);
          current = node.high_node.clone();
        }
        None => break,
      }
    }
    result
  }

  // ----------------------------------------------------------------- long

  pub fn insert_long_order(&mut self, mut node: Order, after_id: Option<&str>) -> EngineResult<OrderId> {
    if node.high_price <= node.low_price {
      return Err(EngineError::Precondition(
        "highest price must be greater than lowest price".into(),
      ));
    }

    let Some(near_id) = self.near_long_node.clone() else {
      let id = node.order_id.clone();
      self.add_order_to_address_map(&node.address, id.clone())?;
      self.near_long_node = Some(id.clone());
      self.long_orders.insert(id.clone(), node);
      return Ok(id);
    };

    match after_id {
      None => {
        let highest = self.long_orders.get(&near_id).expect("near node must exist");
        if node.low_price < highest.high_price {
          return Err(EngineError::Book("overlaps with highest node".into()));
        }
        let id = node.order_id.clone();
        node.low_node = Some(near_id.clone());
        self.add_order_to_address_map(&node.address, id.clone())?;
        self.long_orders.get_mut(&near_id).unwrap().high_node = Some(id.clone());
        self.near_long_node = Some(id.clone());
        self.long_orders.insert(id.clone(), node);
        Ok(id)
      }
      Some(after_id) => {
        let current = self
          .long_orders
          .get(after_id)
          .ok_or_else(|| EngineError::Book(format!("insertion anchor {after_id} does not exist")))?
          .clone();
        if node.high_price > current.low_price {
          return Err(EngineError::Book(format!("overlaps with {after_id} node")));
        }
        let id = node.order_id.clone();
        match current.low_node.clone() {
          Some(lower_id) => {
            let lower = self.long_orders.get(&lower_id).expect("linked node must exist").clone();
            if node.low_price < lower.high_price {
              return Err(EngineError::Book(format!("overlaps with {lower_id} node")));
            }
            node.low_node = Some(lower_id.clone());
            node.high_node = Some(after_id.to_string());
            self.long_orders.get_mut(after_id).unwrap().low_node = Some(id.clone());
            self.long_orders.get_mut(&lower_id).unwrap().high_node = Some(id.clone());
          }
          None => {
            node.low_node = None;
            node.high_node = Some(after_id.to_string());
            self.long_orders.get_mut(after_id).unwrap().low_node = Some(id.clone());
          }
        }
        self.add_order_to_address_map(&node.address, id.clone())?;
        self.long_orders.insert(id.clone(), node);
        Ok(id)
      }
    }
  }

  pub fn delete_long_order(&mut self, id: &str) -> EngineResult<Order> {
    let node = self
      .long_orders
      .remove(id)
      .ok_or_else(|| EngineError::Book(format!("order id {id} not found")))?;

    if let Some(lower_id) = &node.low_node {
      self.long_orders.get_mut(lower_id).unwrap().high_node = node.high_node.clone();
    }
    if let Some(upper_id) = &node.high_node {
      self.long_orders.get_mut(upper_id).unwrap().low_node = node.low_node.clone();
    } else {
      self.near_long_node = node.low_node.clone();
    }

    Ok(node)
  }

  pub fn archive_long_order(&mut self, id: &str, closed: ClosedOrder) -> EngineResult<()> {
    let address = closed.order.address.clone();
    self.delete_long_order(id)?;
    self.remove_order_from_address_map(&address, id, closed);
    Ok(())
  }

  pub fn check_long_order_range(&self, high: f64, low: f64, exclude_id: Option<&str>) -> bool {
    let Some(near_id) = &self.near_long_node else {
      return true;
    };
    if exclude_id == Some(near_id.as_str()) && self.long_orders.len() == 1 {
      return true;
    }

    let mut current = Some(near_id.clone());
    while let Some(id) = current {
      if Some(id.as_str()) != exclude_id {
        let node = self.long_orders.get(&id).expect("linked node must exist");
        if low <= node.high_price && high >= node.low_price {
          return false;
        }
        if low > node.high_price {
          break;
        }
      }
      current = self.long_orders.get(&id).and_then(|n| n.low_node.clone());
    }
    true
  }

  pub fn get_long_order(&self, start_id: Option<&str>, n: usize) -> Vec<&Order> {
    let mut result = Vec::new();
    let mut current = start_id.map(|s| s.to_string()).or_else(|| self.near_long_node.clone());
    while let Some(id) = current {
      if result.len() >= n {
        break;
      }
      match self.long_orders.get(&id) {
        Some(node) => {
          result.push(node);
          current = node.low_node.clone();
        }
        None => break,
      }
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn make_short(id: &str, low: f64, high: f64, address: &str) -> Order {
    Order {
      order_id: id.to_string(),
      order_type: OrderType::Short,
      address: address.to_string(),
      open_price: (low + high) / 2.0,
      forced_close_price: high,
      low_price: low,
      high_price: high,
      base_amount1: 100.0,
      lend_amount0: Some(10.0),
      sell_amount1: Some(10.0),
      lend_amount1: None,
      buy_amount0: None,
      loan_fee: 0.0,
      loan_day_fee: 0.0,
      third_fee: 0.0,
      loan_time: 0,
      high_node: None,
      low_node: None,
    }
  }

  #[test]
  fn insert_first_short_order_becomes_near_node() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    let id = book.insert_short_order(make_short("short1", 0.11, 0.12, "alice"), None).unwrap();
    assert_eq!(book.near_short_node(), Some(&id));
  }

  #[test]
  fn p1_disjoint_short_orders_reject_touching_endpoints() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    book.insert_short_order(make_short("short1", 0.11, 0.12, "alice"), None).unwrap();
    // b2: touching endpoint (0.12 == existing low .. wait existing low is .11)
    let touching = make_short("short2", 0.12, 0.13, "bob");
    // overlapping from below since touching.low(0.12) <= existing.high(0.12)... use bottom insert
    let result = book.insert_short_order(touching, None);
    assert!(result.is_err());
  }

  #[test]
  fn insert_disjoint_short_order_at_bottom_succeeds() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    book.insert_short_order(make_short("short1", 0.12, 0.13, "alice"), None).unwrap();
    let lower = make_short("short2", 0.10, 0.11, "bob");
    let id = book.insert_short_order(lower, None).unwrap();
    assert_eq!(book.near_short_node(), Some(&id));
  }

  #[test]
  fn delete_short_order_updates_near_node() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    let id1 = book.insert_short_order(make_short("short1", 0.11, 0.12, "alice"), None).unwrap();
    let id2 = book
      .insert_short_order(make_short("short2", 0.12, 0.13, "bob"), Some(id1.as_str()))
      .unwrap();
    book.delete_short_order(&id1).unwrap();
    assert_eq!(book.near_short_node(), Some(&id2));
  }

  #[test]
  fn address_order_limit_is_enforced() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    let mut prev: Option<String> = None;
    for i in 0..ORDER_MAX_LENGTH {
      let low = 0.10 + i as f64 * 0.01;
      let high = low + 0.009;
      let node = make_short(&format!("s{i}"), low, high, "alice");
      let id = book.insert_short_order(node, prev.as_deref()).unwrap();
      prev = Some(id);
    }
    let low = 0.10 + ORDER_MAX_LENGTH as f64 * 0.01;
    let overflow = make_short("overflow", low, low + 0.009, "alice");
    let result = book.insert_short_order(overflow, prev.as_deref());
    assert!(result.is_err());
  }

  #[test]
  fn check_short_order_range_detects_overlap() {
    let mut book = OrderBook::new(ORDER_MAX_LENGTH);
    book.insert_short_order(make_short("short1", 0.11, 0.12, "alice"), None).unwrap();
    assert!(!book.check_short_order_range(0.115, 0.105, None));
    assert!(book.check_short_order_range(0.13, 0.125, None));
  }
}
