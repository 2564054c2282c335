//! Shared resource names for bound service account token trust material
//!
//! This crate centralizes the Secret and ConfigMap names and data keys so the
//! controller and `trustctl` always agree on where trust material lives.
//!
//! ## Layout
//!
//! - Operator namespace: the *next* signing key secret, written first
//! - Target namespace: the promoted signing key secret, the trust store
//!   ConfigMap and one frozen trust store snapshot per static pod revision

/// Signing key secret owned by the operator, regenerated when invalid
pub const NEXT_SIGNING_KEY_SECRET: &str = "next-bound-service-account-signing-key";

/// Signing key secret consumed by API server replicas
pub const SIGNING_KEY_SECRET: &str = "bound-service-account-signing-key";

/// Trust store ConfigMap holding every public key that may still verify tokens
pub const TRUST_STORE_CONFIG_MAP: &str = "bound-sa-token-signing-certs";

/// Secret data key for the PEM-encoded private key
pub const PRIVATE_KEY_KEY: &str = "service-account.key";

/// Secret data key for the PEM-encoded public key
pub const PUBLIC_KEY_KEY: &str = "service-account.pub";

const SLOT_PREFIX: &str = "service-account-";
const SLOT_SUFFIX: &str = ".pub";

/// Name of the trust store snapshot rendered for a static pod revision
///
/// ```
/// assert_eq!(names::revision_trust_store_name(7), "bound-sa-token-signing-certs-7");
/// ```
pub fn revision_trust_store_name(revision: i32) -> String {
    format!("{TRUST_STORE_CONFIG_MAP}-{revision}")
}

/// Trust store key for a slot index, zero padded to three digits
///
/// Indexes above 999 keep growing in width; the format never truncates.
pub fn slot_name(index: usize) -> String {
    format!("{SLOT_PREFIX}{index:03}{SLOT_SUFFIX}")
}

/// Slot index encoded in a trust store key, if the key is a slot name
pub fn parse_slot_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(SLOT_PREFIX)?.strip_suffix(SLOT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
