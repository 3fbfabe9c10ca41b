pub mod client_to_relay_communication;
pub mod event;
pub mod filter;
pub mod relay_to_client_communication;
pub mod schnorr;
