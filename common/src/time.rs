//! Wall-clock access for timestamping loans and liquidations.

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Time(DateTime<Utc>);

impl Time {
  pub fn now() -> Self {
    Self(Utc::now())
  }

  pub fn from_unix(unix: i64) -> Self {
    Self(DateTime::from_timestamp(unix, 0).expect("valid unix timestamp"))
  }

  pub fn to_unix(&self) -> i64 {
    self.0.timestamp()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn now_round_trips_through_unix() {
    let t = Time::now();
    let roundtripped = Time::from_unix(t.to_unix());
    assert_eq!(t.to_unix(), roundtripped.to_unix());
  }

  #[test]
  fn to_unix_matches_known_timestamp() {
    let t = Time::from_unix(1_700_000_000);
    assert_eq!(t.to_unix(), 1_700_000_000);
  }
}
