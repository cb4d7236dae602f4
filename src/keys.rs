use ssh_key::private::{KeypairData, RsaKeypair};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, EcdsaCurve, HashAlg, PrivateKey};

use crate::error::Error;
use crate::types::KeyType;

/// Smallest RSA modulus accepted for certificate keys.
pub const MIN_RSA_KEY_SIZE: u32 = 2048;

/// Generates a fresh key pair for a certificate request.
///
/// `key_size` selects the RSA modulus length or the ECDSA curve
/// (256, 384 or 521). It is ignored for `ed25519`.
///
/// # Errors
///
/// Returns [`Error::Config`] for a size the key type cannot use, or
/// [`Error::Key`] if generation itself fails.
pub fn generate_key(key_type: KeyType, key_size: u32) -> Result<PrivateKey, Error> {
    if !key_type.uses_key_size() {
        tracing::debug!(key_type = %key_type, key_size, "Ignoring key size");
    }

    let key = match key_type {
        KeyType::Ed25519 => PrivateKey::random(&mut OsRng, Algorithm::Ed25519)?,
        KeyType::Ecdsa => {
            let curve = ecdsa_curve(key_size)?;
            PrivateKey::random(&mut OsRng, Algorithm::Ecdsa { curve })?
        }
        KeyType::Rsa => {
            if key_size < MIN_RSA_KEY_SIZE {
                return Err(Error::Config(format!(
                    "RSA key size {key_size} is below the minimum of {MIN_RSA_KEY_SIZE}"
                )));
            }
            let keypair = RsaKeypair::random(&mut OsRng, key_size as usize)?;
            PrivateKey::new(KeypairData::from(keypair), "")?
        }
    };

    tracing::debug!(
        key_type = %key_type,
        fingerprint = %key.fingerprint(HashAlg::Sha256),
        "Generated key pair"
    );
    Ok(key)
}

fn ecdsa_curve(key_size: u32) -> Result<EcdsaCurve, Error> {
    match key_size {
        256 => Ok(EcdsaCurve::NistP256),
        384 => Ok(EcdsaCurve::NistP384),
        521 => Ok(EcdsaCurve::NistP521),
        other => Err(Error::Config(format!(
            "unsupported ECDSA key size {other} (expected 256, 384 or 521)"
        ))),
    }
}
