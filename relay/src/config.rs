use std::{
  env,
  fmt::Display,
  str::FromStr,
  sync::{Arc, PoisonError, RwLock},
  time::Duration,
};

use log::info;

pub const DEFAULT_RELAY_HOST: &str = "0.0.0.0:8080";
pub const DEFAULT_PAPER_KIND: u64 = 30023;
pub const DEFAULT_COMMENT_KIND: u64 = 1111;

/// [`RelayConfig`] and [`LiveConfig`] error
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
  #[error("Invalid value `{value}` for {key}")]
  InvalidValue { key: String, value: String },
  #[error("Missing value for {0}")]
  Missing(String),
  #[error("Unknown setting {0}")]
  UnknownKey(String),
}

/// Which payment network the relay settles invoices on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentBackend {
  Mock,
  Lnd,
}

impl FromStr for PaymentBackend {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "mock" => Ok(Self::Mock),
      "lnd" => Ok(Self::Lnd),
      _ => Err(ConfigError::InvalidValue {
        key: "PAYMENT_BACKEND".to_string(),
        value: s.to_string(),
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LndConfig {
  pub url: String,
  /// Hex-encoded admin or invoice macaroon.
  pub macaroon: String,
}

/// Rates the pricing oracle reads on every quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
  /// Price of storing one MiB for one year.
  pub rate_per_mb_year: u64,
  /// Price of one MiB of comment content.
  pub comment_rate_per_mb: u64,
  /// Storage duration papers are charged for.
  pub storage_years: u32,
}

impl Default for PricingConfig {
  fn default() -> Self {
    Self {
      rate_per_mb_year: 1_000,
      comment_rate_per_mb: 100,
      storage_years: 10,
    }
  }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
  pub relay_host: String,
  pub db_path: String,
  pub content_dir: String,
  pub paper_kind: u64,
  pub comment_kind: u64,
  pub pricing: PricingConfig,
  pub max_paper_bytes: u64,
  pub max_comment_bytes: u64,
  /// Content limit for every kind without its own limit.
  pub max_event_bytes: u64,
  pub max_query_limit: usize,
  pub collaborator_timeout: Duration,
  pub invoice_expiry: Duration,
  pub payment_backend: PaymentBackend,
  /// With the mock backend, report every invoice as paid.
  pub mock_auto_settle: bool,
  pub lnd: Option<LndConfig>,
}

impl Default for RelayConfig {
  fn default() -> Self {
    Self {
      relay_host: DEFAULT_RELAY_HOST.to_string(),
      db_path: "db/relay.redb".to_string(),
      content_dir: "content".to_string(),
      paper_kind: DEFAULT_PAPER_KIND,
      comment_kind: DEFAULT_COMMENT_KIND,
      pricing: PricingConfig::default(),
      max_paper_bytes: 10 * 1024 * 1024,
      max_comment_bytes: 64 * 1024,
      max_event_bytes: 256 * 1024,
      max_query_limit: 500,
      collaborator_timeout: Duration::from_secs(5),
      invoice_expiry: Duration::from_secs(3600),
      payment_backend: PaymentBackend::Mock,
      mock_auto_settle: false,
      lnd: None,
    }
  }
}

impl RelayConfig {
  /// Reads the configuration from the process environment.
  /// Unset variables keep their default.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let defaults = Self::default();

    let payment_backend = parse_or(&lookup, "PAYMENT_BACKEND", defaults.payment_backend)?;
    let lnd = match payment_backend {
      PaymentBackend::Mock => None,
      PaymentBackend::Lnd => Some(LndConfig {
        url: lookup("LND_URL").ok_or_else(|| ConfigError::Missing("LND_URL".to_string()))?,
        macaroon: lookup("LND_MACAROON")
          .ok_or_else(|| ConfigError::Missing("LND_MACAROON".to_string()))?,
      }),
    };

    let config = Self {
      relay_host: lookup("RELAY_HOST").unwrap_or(defaults.relay_host),
      db_path: lookup("DB_PATH").unwrap_or(defaults.db_path),
      content_dir: lookup("CONTENT_DIR").unwrap_or(defaults.content_dir),
      paper_kind: parse_or(&lookup, "PAPER_KIND", defaults.paper_kind)?,
      comment_kind: parse_or(&lookup, "COMMENT_KIND", defaults.comment_kind)?,
      pricing: PricingConfig {
        rate_per_mb_year: parse_or(&lookup, "RATE_PER_MB_YEAR", defaults.pricing.rate_per_mb_year)?,
        comment_rate_per_mb: parse_or(
          &lookup,
          "COMMENT_RATE_PER_MB",
          defaults.pricing.comment_rate_per_mb,
        )?,
        storage_years: parse_or(&lookup, "STORAGE_YEARS", defaults.pricing.storage_years)?,
      },
      max_paper_bytes: parse_or(&lookup, "MAX_PAPER_BYTES", defaults.max_paper_bytes)?,
      max_comment_bytes: parse_or(&lookup, "MAX_COMMENT_BYTES", defaults.max_comment_bytes)?,
      max_event_bytes: parse_or(&lookup, "MAX_EVENT_BYTES", defaults.max_event_bytes)?,
      max_query_limit: parse_or(&lookup, "MAX_QUERY_LIMIT", defaults.max_query_limit)?,
      collaborator_timeout: Duration::from_millis(parse_or(
        &lookup,
        "COLLABORATOR_TIMEOUT_MS",
        defaults.collaborator_timeout.as_millis() as u64,
      )?),
      invoice_expiry: Duration::from_secs(parse_or(
        &lookup,
        "INVOICE_EXPIRY_SECS",
        defaults.invoice_expiry.as_secs(),
      )?),
      payment_backend,
      mock_auto_settle: parse_or(&lookup, "MOCK_AUTO_SETTLE", defaults.mock_auto_settle)?,
      lnd,
    };

    if config.paper_kind == config.comment_kind {
      return Err(ConfigError::InvalidValue {
        key: "COMMENT_KIND".to_string(),
        value: config.comment_kind.to_string(),
      });
    }

    info!(
      "Config loaded: host {}, paper kind {}, comment kind {}, payment backend {:?}",
      config.relay_host, config.paper_kind, config.comment_kind, config.payment_backend
    );

    Ok(config)
  }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
  F: Fn(&str) -> Option<String>,
  T: FromStr,
{
  match lookup(key) {
    None => Ok(default),
    Some(value) => value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
      key: key.to_string(),
      value,
    }),
  }
}

/// Pricing settings that can be changed while the relay runs.
///
/// Readers take a copy of the whole [`PricingConfig`], so a quote never mixes
/// values from before and after an update.
#[derive(Debug, Clone, Default)]
pub struct LiveConfig {
  pricing: Arc<RwLock<PricingConfig>>,
}

impl LiveConfig {
  pub fn new(pricing: PricingConfig) -> Self {
    Self {
      pricing: Arc::new(RwLock::new(pricing)),
    }
  }

  pub fn pricing(&self) -> PricingConfig {
    *self.pricing.read().unwrap_or_else(PoisonError::into_inner)
  }

  /// Current value of a setting, by name.
  pub fn get(&self, key: &str) -> Option<String> {
    let pricing = self.pricing();
    match key {
      "rate_per_mb_year" => Some(pricing.rate_per_mb_year.to_string()),
      "comment_rate_per_mb" => Some(pricing.comment_rate_per_mb.to_string()),
      "storage_years" => Some(pricing.storage_years.to_string()),
      _ => None,
    }
  }

  pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
    let mut pricing = self.pricing.write().unwrap_or_else(PoisonError::into_inner);
    match key {
      "rate_per_mb_year" => pricing.rate_per_mb_year = parse_setting(key, value)?,
      "comment_rate_per_mb" => pricing.comment_rate_per_mb = parse_setting(key, value)?,
      "storage_years" => pricing.storage_years = parse_setting(key, value)?,
      _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    info!("Setting {key} changed to {value}");
    Ok(())
  }
}

fn parse_setting<T: FromStr>(key: &str, value: impl Display) -> Result<T, ConfigError> {
  let value = value.to_string();
  value.trim().parse().map_err(|_| ConfigError::InvalidValue {
    key: key.to_string(),
    value,
  })
}
