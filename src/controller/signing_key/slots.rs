//! # Trust Store Slot Allocation
//!
//! Picks the key under which a new public key is appended to the trust store.

use names::slot_name;
use std::collections::BTreeSet;

/// First free `service-account-NNN.pub` name at or above `len(existing) + 1`
///
/// Occupied names are skipped, including slots left behind after a manual
/// revocation. An existing slot is never reused.
pub fn next_free_slot<'a, I>(existing: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let occupied: BTreeSet<&str> = existing.into_iter().map(String::as_str).collect();
    let mut index = occupied.len() + 1;
    loop {
        let candidate = slot_name(index);
        if !occupied.contains(candidate.as_str()) {
            return candidate;
        }
        index += 1;
    }
}
