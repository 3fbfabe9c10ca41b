use std::str::FromStr;

use bitcoin_hashes::{hex::FromHex, sha256};
use secp256k1::{
  schnorr, KeyPair, Message, PublicKey, Secp256k1, SecretKey, Signing, Verification,
  XOnlyPublicKey,
};

#[derive(Debug)]
pub struct AsymmetricKeys {
  pub private_key: SecretKey,
  pub public_key: PublicKey,
}

impl AsymmetricKeys {
  /// Hex of the 32-bytes x-only public key, the form Nostr uses for `pubkey`.
  pub fn x_only_public_key(&self) -> String {
    self.public_key.x_only_public_key().0.to_string()
  }
}

/// [`Schnorr`] error
#[derive(thiserror::Error, Debug)]
pub enum SchnorrError {
  /// Error related to bitcoin_hashes::hex
  #[error(transparent)]
  SHA256(#[from] bitcoin_hashes::hex::Error),

  /// Error secp256k1
  #[error(transparent)]
  SECP256K1(#[from] secp256k1::Error),
}

///
/// Signs a Schnorr (BIP-340) signature for an already hashed message.
///
/// ## Arguments
///
/// * `secp` - A Secp256k1 engine to execute signature.
/// * `msg` - A hex-encoded SHA256 hash (an event id).
/// * `seckey` - The Private Key to sign the message.
///
/// ## Examples
///
/// ```
///     use nostr_sdk::schnorr::*;
///     use secp256k1::Secp256k1;
///
///     let seckey = [
///      59, 148, 11, 85, 134, 130, 61, 253, 2, 174, 59, 70, 27, 180, 51, 107, 94, 203, 174, 253, 102,
///      39, 170, 146, 46, 252, 4, 143, 236, 12, 136, 28,
///     ];
///     let id = "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae".to_string();
///     let secp = Secp256k1::new();
///     assert!(sign_schnorr(&secp, id, seckey.to_vec()).is_ok());
/// ```
pub fn sign_schnorr<C: Signing>(
  secp: &Secp256k1<C>,
  msg: String,
  seckey: Vec<u8>,
) -> Result<schnorr::Signature, SchnorrError> {
  let hash_from_hex = sha256::Hash::from_hex(&msg)?;
  let msg = Message::from_slice(hash_from_hex.as_ref())?;
  match SecretKey::from_slice(&seckey) {
    Ok(seckey) => {
      let keypair = KeyPair::from_secret_key(secp, &seckey);
      Ok(secp.sign_schnorr_no_aux_rand(&msg, &keypair))
    }
    Err(err) => {
      log::error!("[sign_schnorr > SecretKey::from_slice] {err}");
      Err(SchnorrError::SECP256K1(err))
    }
  }
}

///
/// Verifies a Schnorr signature of an already hashed message.
///
/// Returns `Ok(true)` when the signature is valid, an error otherwise
/// (malformed hash, malformed key or failed verification).
///
/// ## Examples
///
/// ```
///     use nostr_sdk::schnorr::*;
///     use std::str::FromStr;
///     use secp256k1::{Secp256k1, schnorr};
///
///     let secp = Secp256k1::new();
///     let sig = schnorr::Signature::from_str("bf073c935f71de50ec72bdb79f75b0bf32f9049305c3b22f97c06422c6f2edc86e0d7e07d7d7222678b238b1daee071be5f6fa653c611971395ec0d1c6407caf").unwrap();
///     let id = "00960bd35499f8c63a4f65e79d6b1a2b7f1b8c97e76652325567b78c496350ae".to_string();
///     let pubkey = "614a695bab54e8dc98946abdb8ec019599ece6dada0c23890977d0fa128081d6".to_string();
///     assert!(verify_schnorr(&secp, id, sig, pubkey).unwrap());
/// ```
pub fn verify_schnorr<C: Verification>(
  secp: &Secp256k1<C>,
  msg: String,
  sig: schnorr::Signature,
  pubkey: String,
) -> Result<bool, SchnorrError> {
  let hash_from_hex = sha256::Hash::from_hex(&msg)?;
  let msg = Message::from_slice(hash_from_hex.as_ref())?;
  let x_only_pubkey = XOnlyPublicKey::from_str(&pubkey)?;

  match secp.verify_schnorr(&sig, &msg, &x_only_pubkey) {
    Ok(_) => Ok(true),
    Err(err) => {
      log::debug!("[verify_schnorr] {err}");
      Err(SchnorrError::SECP256K1(err))
    }
  }
}

///
/// Generates a random keypair usable for Schnorr signatures.
///
pub fn generate_keys() -> AsymmetricKeys {
  let secp = Secp256k1::new();
  let mut rng = rand::thread_rng();

  let (seckey, pubkey) = secp.generate_keypair(&mut rng);

  AsymmetricKeys {
    public_key: pubkey,
    private_key: seckey,
  }
}
