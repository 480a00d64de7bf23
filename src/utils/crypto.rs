//! # Signing and Verification
//!
//! RSA key pairs and PKCS#1 v1.5 signatures for the measurement upload channel.
//!
//! The wire format fixes the key and signature sizes: a 2048-bit RSA public key
//! encoded as X.509 `SubjectPublicKeyInfo` DER is always 294 bytes, and a
//! signature is always `2048 / 8 = 256` bytes.
//!
//! ## Security
//! SHA-1 with RSA is kept for compatibility with deployed peers. It is weak
//! against collision attacks; [`SignatureScheme`] is the switch a migration
//! flips.
//!
//! ## Usage
//! ```rust,no_run
//! use timeprobe_protocol::utils::crypto::{generate_key_pair, sign, verify};
//!
//! let pair = generate_key_pair()?;
//! let signature = sign(b"hello", &pair)?;
//! assert!(verify(b"hello", &pair.encoded_public_key()?, &signature)?);
//! # Ok::<(), timeprobe_protocol::error::ProtocolError>(())
//! ```

use crate::error::{constants, ProtocolError, Result};
use rand_core::OsRng;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use std::fmt;
use tracing::{debug, instrument};

/// Modulus size of every key used on the wire.
pub const KEY_PAIR_BITS: usize = 2048;

/// Length of a DER `SubjectPublicKeyInfo` for a [`KEY_PAIR_BITS`] RSA key.
pub const PUBLIC_KEY_LENGTH: usize = 294;

/// Length of a PKCS#1 v1.5 signature for a [`KEY_PAIR_BITS`] RSA key.
pub const SIGNATURE_LENGTH: usize = KEY_PAIR_BITS / 8;

/// Signing algorithms understood by peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureScheme {
    /// RSASSA-PKCS1-v1_5 over SHA-1.
    #[default]
    Sha1WithRsa,
}

impl SignatureScheme {
    pub fn name(self) -> &'static str {
        match self {
            SignatureScheme::Sha1WithRsa => "SHA1withRSA",
        }
    }
}

/// An RSA key pair able to sign measurement uploads.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Wrap an existing private key.
    ///
    /// # Errors
    /// Returns `ProtocolError::CryptoFormat` if the modulus is not
    /// [`KEY_PAIR_BITS`] wide.
    pub fn from_private_key(private: RsaPrivateKey) -> Result<Self> {
        if private.size() != SIGNATURE_LENGTH {
            return Err(ProtocolError::CryptoFormat(
                constants::ERR_PUBLIC_KEY_SIZE.to_string(),
            ));
        }
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// The public key as it travels on the wire.
    ///
    /// # Errors
    /// Returns `ProtocolError::CryptoFormat` if DER encoding fails.
    pub fn encoded_public_key(&self) -> Result<Vec<u8>> {
        let document = self
            .public
            .to_public_key_der()
            .map_err(|e| ProtocolError::CryptoFormat(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print private key material
        f.debug_struct("KeyPair")
            .field("bits", &(self.public.size() * 8))
            .finish_non_exhaustive()
    }
}

/// Generate a fresh [`KEY_PAIR_BITS`] RSA key pair from the OS RNG.
///
/// # Errors
/// Returns `ProtocolError::KeyGeneration` if the provider fails.
#[instrument]
pub fn generate_key_pair() -> Result<KeyPair> {
    let private = RsaPrivateKey::new(&mut OsRng, KEY_PAIR_BITS)
        .map_err(|e| ProtocolError::KeyGeneration(e.to_string()))?;
    debug!(bits = KEY_PAIR_BITS, "Generated RSA key pair");
    KeyPair::from_private_key(private)
}

/// Sign `message` with the private half of `key_pair`.
///
/// PKCS#1 v1.5 is deterministic: the same key and message always produce the
/// same signature.
///
/// # Errors
/// Returns `ProtocolError::Signing` if the provider rejects the key.
pub fn sign(message: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>> {
    sign_with(SignatureScheme::default(), message, key_pair)
}

/// [`sign`] with an explicit scheme.
pub fn sign_with(scheme: SignatureScheme, message: &[u8], key_pair: &KeyPair) -> Result<Vec<u8>> {
    match scheme {
        SignatureScheme::Sha1WithRsa => {
            let signing_key = SigningKey::<Sha1>::new(key_pair.private.clone());
            let signature = signing_key
                .try_sign(message)
                .map_err(|e| ProtocolError::Signing(e.to_string()))?;
            Ok(signature.to_vec())
        }
    }
}

/// Verify `signature` over `message` against a DER-encoded public key.
///
/// Returns `Ok(false)` when everything parses but the signature does not
/// match.
///
/// # Errors
/// Returns `ProtocolError::CryptoFormat` when the key does not decode, the key
/// is not [`KEY_PAIR_BITS`] wide, or the signature is not
/// [`SIGNATURE_LENGTH`] bytes.
pub fn verify(message: &[u8], encoded_public_key: &[u8], signature: &[u8]) -> Result<bool> {
    verify_with(
        SignatureScheme::default(),
        message,
        encoded_public_key,
        signature,
    )
}

/// [`verify`] with an explicit scheme.
pub fn verify_with(
    scheme: SignatureScheme,
    message: &[u8],
    encoded_public_key: &[u8],
    signature: &[u8],
) -> Result<bool> {
    let public_key = decode_public_key(encoded_public_key)?;
    if signature.len() != SIGNATURE_LENGTH {
        return Err(ProtocolError::CryptoFormat(format!(
            "{} ({} bytes, expected {SIGNATURE_LENGTH})",
            constants::ERR_SIGNATURE_LENGTH,
            signature.len()
        )));
    }
    let signature = Signature::try_from(signature)
        .map_err(|e| ProtocolError::CryptoFormat(e.to_string()))?;

    match scheme {
        SignatureScheme::Sha1WithRsa => {
            let verifying_key = VerifyingKey::<Sha1>::new(public_key);
            Ok(verifying_key.verify(message, &signature).is_ok())
        }
    }
}

/// Parse a wire-encoded public key and check its modulus size.
///
/// # Errors
/// Returns `ProtocolError::CryptoFormat` on any parse or size failure.
pub fn decode_public_key(encoded_public_key: &[u8]) -> Result<RsaPublicKey> {
    let public_key = RsaPublicKey::from_public_key_der(encoded_public_key).map_err(|e| {
        ProtocolError::CryptoFormat(format!("{}: {e}", constants::ERR_PUBLIC_KEY_DECODE))
    })?;
    if public_key.size() != SIGNATURE_LENGTH {
        return Err(ProtocolError::CryptoFormat(format!(
            "{} ({} bits)",
            constants::ERR_PUBLIC_KEY_SIZE,
            public_key.size() * 8
        )));
    }
    Ok(public_key)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::OnceLock;

    fn key_pair() -> &'static KeyPair {
        static PAIR: OnceLock<KeyPair> = OnceLock::new();
        PAIR.get_or_init(|| generate_key_pair().expect("key generation"))
    }

    #[test]
    fn test_encoded_lengths() {
        let pair = key_pair();
        assert_eq!(pair.encoded_public_key().unwrap().len(), PUBLIC_KEY_LENGTH);
        assert_eq!(sign(b"x", pair).unwrap().len(), SIGNATURE_LENGTH);
    }

    #[test]
    fn test_sign_is_deterministic() {
        let pair = key_pair();
        assert_eq!(sign(b"batch", pair).unwrap(), sign(b"batch", pair).unwrap());
    }

    #[test]
    fn test_verify_accepts_and_rejects() {
        let pair = key_pair();
        let key = pair.encoded_public_key().unwrap();
        let signature = sign(b"hello", pair).unwrap();

        assert!(verify(b"hello", &key, &signature).unwrap());
        assert!(!verify(b"hellp", &key, &signature).unwrap());

        let mut tampered = signature.clone();
        tampered[10] ^= 0x01;
        assert!(!verify(b"hello", &key, &tampered).unwrap());
    }

    #[test]
    fn test_verify_format_errors() {
        let pair = key_pair();
        let key = pair.encoded_public_key().unwrap();
        let signature = sign(b"hello", pair).unwrap();

        assert!(matches!(
            verify(b"hello", &key, &signature[..SIGNATURE_LENGTH - 1]),
            Err(ProtocolError::CryptoFormat(_))
        ));
        assert!(matches!(
            verify(b"hello", &[0u8; PUBLIC_KEY_LENGTH], &signature),
            Err(ProtocolError::CryptoFormat(_))
        ));
    }

    #[test]
    fn test_debug_hides_private_key() {
        let text = format!("{:?}", key_pair());
        assert!(text.contains("2048"));
        assert!(!text.contains("private"));
    }

    #[test]
    fn test_scheme_name() {
        assert_eq!(SignatureScheme::default().name(), "SHA1withRSA");
    }
}
