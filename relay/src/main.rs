use env_logger::Env;
use log::error;
use relay::{config::RelayConfig, server};

fn main() {
  dotenv::dotenv().ok();
  std::env::set_var("RUST_LOG_STYLE", "always");
  env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

  let config = match RelayConfig::from_env() {
    Ok(config) => config,
    Err(err) => {
      error!("Invalid configuration: {err}");
      std::process::exit(1);
    }
  };

  if let Err(err) = server::initiate_relay(config) {
    error!("Relay stopped: {err}");
    std::process::exit(1);
  }
}
