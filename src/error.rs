//! # Error Types
//!
//! Errors returned by the resource client, the crypto capability and both
//! controllers, with classification of transient vs permanent failures.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Controller error
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that is not a conflict or a valid absence
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic concurrency failure on write (resourceVersion mismatch)
    #[error("{kind} {namespace}/{name} was modified concurrently")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Create raced another writer
    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Required object is absent
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Key pair generation failed
    #[error("failed to generate signing key pair: {0}")]
    KeyGeneration(String),

    /// Public and private key do not form a valid pair
    #[error("invalid signing key pair: {0}")]
    InvalidKeyPair(String),

    /// Operator signing secret exists but carries no public key
    #[error("operator signing secret {namespace}/{name} is missing a value for key {key:?}")]
    MissingPublicKey {
        namespace: String,
        name: String,
        key: &'static str,
    },

    /// The operand secret cannot be updated until the trust store holds the new public key
    #[error("unable to promote bound service account token signing key until the public key configmap has been updated")]
    NotYetPromotable,

    /// Issuer transition would grow the status list past its bound
    #[error("refusing to track {count} service account issuers, at most {max} are allowed; wait for trusted issuers to expire")]
    TooManyIssuers { count: usize, max: usize },

    /// Serialization failure while building a patch
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration value could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Several independent steps failed
    #[error("{}", join_messages(.0))]
    Aggregate(Vec<Error>),
}

fn join_messages(errors: &[Error]) -> String {
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("[{}]", messages.join(", "))
}

impl Error {
    /// Collapse a list of step errors into at most one error
    ///
    /// An empty list yields `None`, a single error is returned as is.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Aggregate(errors)),
        }
    }

    /// Whether a retry without operator intervention can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(_)
            | Error::Conflict { .. }
            | Error::AlreadyExists { .. }
            | Error::NotFound { .. }
            | Error::NotYetPromotable => true,
            Error::KeyGeneration(_)
            | Error::InvalidKeyPair(_)
            | Error::MissingPublicKey { .. }
            | Error::TooManyIssuers { .. }
            | Error::Serialization(_)
            | Error::InvalidConfig(_) => false,
            Error::Aggregate(errors) => errors.iter().all(Error::is_transient),
        }
    }

    /// Whether the only problem is a pending trust store update
    ///
    /// Such errors resolve on their own once the trust store step runs, so the
    /// error policy retries them at the resync cadence instead of backing off.
    pub fn is_not_yet_promotable(&self) -> bool {
        match self {
            Error::NotYetPromotable => true,
            Error::Aggregate(errors) => errors.iter().all(Error::is_not_yet_promotable),
            _ => false,
        }
    }

    /// Short label used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::Conflict { .. } => "conflict",
            Error::AlreadyExists { .. } => "already_exists",
            Error::NotFound { .. } => "not_found",
            Error::KeyGeneration(_) => "key_generation",
            Error::InvalidKeyPair(_) => "invalid_key_pair",
            Error::MissingPublicKey { .. } => "missing_public_key",
            Error::NotYetPromotable => "not_yet_promotable",
            Error::TooManyIssuers { .. } => "too_many_issuers",
            Error::Serialization(_) => "serialization",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Aggregate(_) => "aggregate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_none() {
        assert!(Error::aggregate(Vec::new()).is_none());
    }

    #[test]
    fn test_aggregate_single_is_unwrapped() {
        let err = Error::aggregate(vec![Error::NotYetPromotable]);
        assert!(matches!(err, Some(Error::NotYetPromotable)));
    }

    #[test]
    fn test_aggregate_many_keeps_every_message() {
        let err = Error::aggregate(vec![
            Error::NotYetPromotable,
            Error::TooManyIssuers { count: 11, max: 10 },
        ])
        .unwrap();
        let message = err.to_string();
        assert!(message.contains("public key configmap"));
        assert!(message.contains("11 service account issuers"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::NotYetPromotable.is_transient());
        assert!(Error::Conflict {
            kind: "Secret",
            namespace: "ns".into(),
            name: "n".into()
        }
        .is_transient());
        assert!(!Error::TooManyIssuers { count: 11, max: 10 }.is_transient());
        assert!(!Error::Aggregate(vec![
            Error::NotYetPromotable,
            Error::KeyGeneration("boom".into())
        ])
        .is_transient());
    }

    #[test]
    fn test_not_yet_promotable_inside_aggregate() {
        assert!(Error::Aggregate(vec![Error::NotYetPromotable]).is_not_yet_promotable());
        assert!(!Error::Aggregate(vec![
            Error::NotYetPromotable,
            Error::KeyGeneration("boom".into())
        ])
        .is_not_yet_promotable());
    }
}
