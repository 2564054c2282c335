//! # Signing Key Crypto
//!
//! Generation and validation of the RSA key pairs used to sign bound service
//! account tokens. Keys are exchanged as PEM bytes: PKCS#1 for the private key
//! and SubjectPublicKeyInfo for the public key, the formats the API server
//! reads from `--service-account-signing-key-file` and `--service-account-key-file`.

use crate::error::{Error, Result};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// PEM-encoded key pair
///
/// The private half is wiped from memory when dropped.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: Zeroizing<Vec<u8>>,
    pub public_key: Vec<u8>,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &fingerprint(&self.public_key))
            .finish()
    }
}

/// Signing key capability: mint new pairs and check existing ones
pub trait SigningKeyCrypto: Send + Sync {
    /// Generate a fresh key pair
    fn generate(&self) -> Result<KeyPair>;

    /// Check that `public_pem` and `private_pem` form a well-formed, matching pair
    fn validate(&self, public_pem: &[u8], private_pem: &[u8]) -> Result<()>;
}

/// RSA signing keys backed by the `rsa` crate
#[derive(Debug, Clone)]
pub struct RsaSigningKeyCrypto {
    bits: usize,
}

impl RsaSigningKeyCrypto {
    pub fn new(bits: usize) -> Self {
        Self { bits }
    }
}

impl Default for RsaSigningKeyCrypto {
    fn default() -> Self {
        Self::new(crate::constants::SIGNING_KEY_BITS)
    }
}

impl SigningKeyCrypto for RsaSigningKeyCrypto {
    fn generate(&self) -> Result<KeyPair> {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), self.bits)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);

        let private_pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;

        Ok(KeyPair {
            private_key: Zeroizing::new(private_pem.as_bytes().to_vec()),
            public_key: public_pem.into_bytes(),
        })
    }

    fn validate(&self, public_pem: &[u8], private_pem: &[u8]) -> Result<()> {
        validate_key_pair(public_pem, private_pem)
    }
}

/// Check that both halves parse and that the public key belongs to the private key
pub fn validate_key_pair(public_pem: &[u8], private_pem: &[u8]) -> Result<()> {
    let private_str = Zeroizing::new(
        String::from_utf8(private_pem.to_vec())
            .map_err(|e| Error::InvalidKeyPair(format!("private key is not UTF-8: {e}")))?,
    );
    let public_str = std::str::from_utf8(public_pem)
        .map_err(|e| Error::InvalidKeyPair(format!("public key is not UTF-8: {e}")))?;

    let private = RsaPrivateKey::from_pkcs1_pem(&private_str)
        .map_err(|e| Error::InvalidKeyPair(format!("failed to parse private key: {e}")))?;
    private
        .validate()
        .map_err(|e| Error::InvalidKeyPair(format!("private key is malformed: {e}")))?;
    let public = RsaPublicKey::from_public_key_pem(public_str)
        .map_err(|e| Error::InvalidKeyPair(format!("failed to parse public key: {e}")))?;

    if RsaPublicKey::from(&private) != public {
        return Err(Error::InvalidKeyPair(
            "public key does not match private key".to_string(),
        ));
    }
    Ok(())
}

/// SHA-256 fingerprint of a public key PEM, for logs and CLI output
pub fn fingerprint(public_pem: &[u8]) -> String {
    let digest = Sha256::digest(public_pem);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("sha256:{}", &hex[..16])
}


#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::ThreadId;

    /// Deterministic stand-in for RSA: pair `n` is `public-n` / `private-n`
    #[derive(Debug, Default)]
    pub(crate) struct FakeCrypto {
        generated: AtomicUsize,
        generated_on: Mutex<Option<ThreadId>>,
    }

    impl FakeCrypto {
        pub(crate) fn pair(n: usize) -> KeyPair {
            KeyPair {
                private_key: Zeroizing::new(format!("private-{n}").into_bytes()),
                public_key: format!("public-{n}").into_bytes(),
            }
        }

        pub(crate) fn generated(&self) -> usize {
            self.generated.load(Ordering::SeqCst)
        }

        /// Thread that ran the most recent `generate`
        pub(crate) fn generated_on(&self) -> Option<ThreadId> {
            *self.generated_on.lock().unwrap()
        }
    }

    impl SigningKeyCrypto for FakeCrypto {
        fn generate(&self) -> Result<KeyPair> {
            // Numbering starts at 100 so generated pairs never collide with seeded ones.
            let n = 100 + self.generated.fetch_add(1, Ordering::SeqCst);
            *self.generated_on.lock().unwrap() = Some(std::thread::current().id());
            Ok(Self::pair(n))
        }

        fn validate(&self, public_pem: &[u8], private_pem: &[u8]) -> Result<()> {
            let public = std::str::from_utf8(public_pem).unwrap_or_default();
            let private = std::str::from_utf8(private_pem).unwrap_or_default();
            match (public.strip_prefix("public-"), private.strip_prefix("private-")) {
                (Some(a), Some(b)) if a == b && !a.is_empty() => Ok(()),
                _ => Err(Error::InvalidKeyPair("fake pair mismatch".to_string())),
            }
        }
    }
}
