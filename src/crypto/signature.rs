//! Ed25519 signatures over transaction digests
//!
//! Signed submissions carry hex-encoded public keys and signatures; the
//! signature covers the raw SHA-256 digest bytes of the transaction's
//! canonical serialization, not the serialization itself.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// Errors raised while checking a signed transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("malformed secret key")]
    MalformedSecretKey,
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Verifies a hex-encoded Ed25519 signature over `message`
pub fn verify(message: &[u8], pubkey_hex: &str, signature_hex: &str) -> Result<(), SignatureError> {
    let pk_bytes: [u8; 32] = hex::decode(pubkey_hex)
        .map_err(|_| SignatureError::MalformedPublicKey)?
        .try_into()
        .map_err(|_| SignatureError::MalformedPublicKey)?;
    let pk = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| SignatureError::MalformedPublicKey)?;

    let sig_bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|_| SignatureError::MalformedSignature)?
        .try_into()
        .map_err(|_| SignatureError::MalformedSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);

    pk.verify_strict(message, &sig)
        .map_err(|_| SignatureError::VerificationFailed)
}

/// Signs `message` with a hex-encoded secret key, returning the
/// signature as hex
pub fn sign(message: &[u8], secret_hex: &str) -> Result<String, SignatureError> {
    let sk_bytes: [u8; 32] = hex::decode(secret_hex)
        .map_err(|_| SignatureError::MalformedSecretKey)?
        .try_into()
        .map_err(|_| SignatureError::MalformedSecretKey)?;
    let sk = SigningKey::from_bytes(&sk_bytes);
    Ok(hex::encode(sk.sign(message).to_bytes()))
}

/// Generates a fresh keypair, returned as (secret hex, public hex)
pub fn generate_keypair() -> (String, String) {
    let sk = SigningKey::generate(&mut OsRng);
    let secret_hex = hex::encode(sk.to_bytes());
    let public_hex = hex::encode(sk.verifying_key().to_bytes());
    (secret_hex, public_hex)
}
