//! # Issuer Status Transitions
//!
//! Pure functions computing the next `status.serviceAccountIssuers` list.

use crate::crd::ServiceAccountIssuerStatus;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// The active issuer: the first entry without an expiration
pub fn active_issuer(issuers: &[ServiceAccountIssuerStatus]) -> Option<&ServiceAccountIssuerStatus> {
    issuers.iter().find(|i| i.is_active())
}

/// Promote `new_active` and demote `old_active` to trusted until `expiration`
///
/// The result starts with `new_active`. Every existing entry named
/// `new_active` is dropped, the entry named `old_active` is stamped with
/// `expiration` if it was active, and all other entries are carried over.
/// A result longer than `max` is rejected rather than truncated.
pub fn make_active_issuer_trusted(
    issuers: &[ServiceAccountIssuerStatus],
    old_active: &str,
    new_active: &str,
    expiration: DateTime<Utc>,
    max: usize,
) -> Result<Vec<ServiceAccountIssuerStatus>> {
    let mut result = Vec::with_capacity(issuers.len() + 1);
    result.push(ServiceAccountIssuerStatus::active(new_active));

    for issuer in issuers {
        if issuer.name == new_active {
            continue;
        }
        if issuer.name == old_active && issuer.is_active() {
            result.push(ServiceAccountIssuerStatus::trusted(&issuer.name, expiration));
            continue;
        }
        result.push(issuer.clone());
    }

    if result.len() > max {
        return Err(Error::TooManyIssuers {
            count: result.len(),
            max,
        });
    }
    Ok(result)
}

/// Split issuers into those still trusted at `now` and the names of expired ones
///
/// An entry expires once its expiration is at or before `now`.
pub fn prune_expired_issuers(
    issuers: &[ServiceAccountIssuerStatus],
    now: DateTime<Utc>,
) -> (Vec<ServiceAccountIssuerStatus>, Vec<String>) {
    let (kept, removed): (Vec<_>, Vec<_>) = issuers
        .iter()
        .cloned()
        .partition(|i| i.expiration_time.is_none_or(|t| t > now));
    (kept, removed.into_iter().map(|i| i.name).collect())
}

/// Number of active and trusted entries
pub fn count_by_state(issuers: &[ServiceAccountIssuerStatus]) -> (usize, usize) {
    let active = issuers.iter().filter(|i| i.is_active()).count();
    (active, issuers.len() - active)
}
