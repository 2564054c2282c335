//! # Revision Propagation
//!
//! Helpers deciding whether a public key has reached every API server replica.
//! A replica verifies tokens against the trust store snapshot frozen into the
//! static pod revision it runs, so a key counts as propagated only once every
//! revision currently running on some node carries it.

use crate::crd::NodeStatus;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeSet;

/// Distinct `currentRevision` values across node statuses
pub fn distinct_revisions(node_statuses: &[NodeStatus]) -> BTreeSet<i32> {
    node_statuses.iter().map(|n| n.current_revision).collect()
}

/// Whether any value of the snapshot ConfigMap equals `public_key`
pub fn snapshot_contains_key(snapshot: &ConfigMap, public_key: &str) -> bool {
    snapshot
        .data
        .as_ref()
        .is_some_and(|data| data.values().any(|v| v == public_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn node(name: &str, revision: i32) -> NodeStatus {
        NodeStatus {
            node_name: name.to_string(),
            current_revision: revision,
            target_revision: None,
        }
    }

    fn snapshot(values: &[&str]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("bound-sa-token-signing-certs-3".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (names::slot_name(i + 1), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_distinct_revisions_collapses_duplicates() {
        let nodes = vec![node("master-0", 4), node("master-1", 5), node("master-2", 4)];
        assert_eq!(distinct_revisions(&nodes), BTreeSet::from([4, 5]));
    }

    #[test]
    fn test_distinct_revisions_empty() {
        assert!(distinct_revisions(&[]).is_empty());
    }

    #[test]
    fn test_snapshot_contains_key() {
        let cm = snapshot(&["public-1", "public-2"]);
        assert!(snapshot_contains_key(&cm, "public-2"));
        assert!(!snapshot_contains_key(&cm, "public-3"));
    }

    #[test]
    fn test_snapshot_without_data() {
        assert!(!snapshot_contains_key(&ConfigMap::default(), "public-1"));
    }

    proptest! {
        /// Output holds each input revision exactly once.
        #[test]
        fn distinct_revisions_is_deduplicated(revisions in proptest::collection::vec(0i32..20, 0..30)) {
            let nodes: Vec<NodeStatus> = revisions
                .iter()
                .enumerate()
                .map(|(i, r)| node(&format!("node-{i}"), *r))
                .collect();
            let result = distinct_revisions(&nodes);
            let expected: BTreeSet<i32> = revisions.iter().copied().collect();
            prop_assert_eq!(result.len(), expected.len());
            prop_assert_eq!(result, expected);
        }

        /// Reordering node statuses does not change the result.
        #[test]
        fn distinct_revisions_is_order_independent(revisions in proptest::collection::vec(0i32..20, 0..30)) {
            let nodes: Vec<NodeStatus> = revisions
                .iter()
                .enumerate()
                .map(|(i, r)| node(&format!("node-{i}"), *r))
                .collect();
            let mut reversed = nodes.clone();
            reversed.reverse();
            let mut sorted = nodes.clone();
            sorted.sort_by_key(|n| n.current_revision);
            prop_assert_eq!(distinct_revisions(&nodes), distinct_revisions(&reversed));
            prop_assert_eq!(distinct_revisions(&nodes), distinct_revisions(&sorted));
        }
    }
}
