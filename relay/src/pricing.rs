use crate::config::{LiveConfig, PricingConfig};

/// Bytes in one MiB, the unit rates are expressed in.
pub const MIB: u128 = 1024 * 1024;

/// Quotes prices for priced content from the live rates.
///
/// All arithmetic is done on integers, so the quote handed to a client and the
/// re-check made when the event comes back with a payment always agree as long
/// as the rates did not change in between.
#[derive(Debug, Clone)]
pub struct PricingOracle {
  config: LiveConfig,
}

impl PricingOracle {
  pub fn new(config: LiveConfig) -> Self {
    Self { config }
  }

  /// `ceil(size_bytes / MiB * rate_per_mb_year * duration_years)`
  pub fn price(&self, size_bytes: u64, duration_years: u32) -> u64 {
    storage_price(&self.config.pricing(), size_bytes, duration_years)
  }

  /// `max(1, ceil(size_bytes / MiB * comment_rate_per_mb))`
  pub fn comment_price(&self, size_bytes: u64) -> u64 {
    comment_price(&self.config.pricing(), size_bytes)
  }

  /// Storage duration papers are charged for.
  pub fn storage_years(&self) -> u32 {
    self.config.pricing().storage_years
  }
}

fn storage_price(pricing: &PricingConfig, size_bytes: u64, duration_years: u32) -> u64 {
  let units = (size_bytes as u128)
    .saturating_mul(pricing.rate_per_mb_year as u128)
    .saturating_mul(duration_years as u128);
  saturate(div_ceil(units, MIB))
}

fn comment_price(pricing: &PricingConfig, size_bytes: u64) -> u64 {
  let units = (size_bytes as u128).saturating_mul(pricing.comment_rate_per_mb as u128);
  saturate(div_ceil(units, MIB)).max(1)
}

fn div_ceil(numerator: u128, denominator: u128) -> u128 {
  numerator / denominator + u128::from(numerator % denominator != 0)
}

fn saturate(value: u128) -> u64 {
  u64::try_from(value).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[cfg(test)]
  use pretty_assertions::assert_eq;

  struct Sut {
    live: LiveConfig,
    oracle: PricingOracle,
  }

  impl Sut {
    fn new(rate_per_mb_year: u64, comment_rate_per_mb: u64) -> Self {
      let live = LiveConfig::new(PricingConfig {
        rate_per_mb_year,
        comment_rate_per_mb,
        storage_years: 10,
      });
      let oracle = PricingOracle::new(live.clone());

      Self { live, oracle }
    }
  }

  #[test]
  fn price_of_whole_mebibytes() {
    let sut = Sut::new(1_000, 100);

    assert_eq!(sut.oracle.price(1024 * 1024, 1), 1_000);
    assert_eq!(sut.oracle.price(3 * 1024 * 1024, 10), 30_000);
  }

  #[test]
  fn price_rounds_up() {
    let sut = Sut::new(1_000, 100);

    // 1 byte of one MiB-year at 1000 is 0.00095..., charged as 1
    assert_eq!(sut.oracle.price(1, 1), 1);
    // half a MiB for 3 years is exactly 1500
    assert_eq!(sut.oracle.price(512 * 1024, 3), 1_500);
    assert_eq!(sut.oracle.price(512 * 1024 + 1, 3), 1_501);
  }

  #[test]
  fn price_of_nothing_is_zero() {
    let sut = Sut::new(1_000, 100);

    assert_eq!(sut.oracle.price(0, 10), 0);
    assert_eq!(sut.oracle.price(4096, 0), 0);
  }

  #[test]
  fn comment_price_has_a_floor_of_one() {
    let sut = Sut::new(1_000, 100);

    // 2048 bytes at 100 per MiB is 0.195..., rounded up to 1
    assert_eq!(sut.oracle.comment_price(2048), 1);
    assert_eq!(sut.oracle.comment_price(0), 1);
    assert_eq!(sut.oracle.comment_price(1024 * 1024), 100);
    assert_eq!(sut.oracle.comment_price(1024 * 1024 + 1), 101);
  }

  #[test]
  fn prices_follow_live_rate_changes() {
    let sut = Sut::new(1_000, 100);

    sut.live.set("rate_per_mb_year", "2000").unwrap();
    sut.live.set("storage_years", "2").unwrap();

    assert_eq!(sut.oracle.price(1024 * 1024, 1), 2_000);
    assert_eq!(sut.oracle.storage_years(), 2);
  }

  #[test]
  fn huge_inputs_saturate() {
    let sut = Sut::new(u64::MAX, u64::MAX);

    assert_eq!(sut.oracle.price(u64::MAX, u32::MAX), u64::MAX);
    assert_eq!(sut.oracle.comment_price(u64::MAX), u64::MAX);
  }
}
