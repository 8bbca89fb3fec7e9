//! Security-policy stage: mark edges covered by a mutual-TLS policy.
//!
//! Matching is namespace-granular: a policy names a destination namespace
//! and optionally a source namespace; an empty source covers any source.
//! An absent policy section marks nothing.

use std::collections::BTreeMap;

use crate::graph::TrafficMap;
use crate::graph::meta::IS_MTLS;
use crate::mesh::MeshSnapshot;
use crate::options::Options;

pub(super) fn apply(traffic_map: &mut TrafficMap, _options: &Options, mesh: &MeshSnapshot) {
    if mesh.mtls_policies.is_empty() {
        tracing::debug!("no mTLS policies in snapshot");
        return;
    }

    // Dest namespaces must be looked up through the owning map.
    let namespace_of: BTreeMap<String, String> = traffic_map
        .values()
        .map(|n| (n.id.clone(), n.namespace.clone()))
        .collect();

    for node in traffic_map.values_mut() {
        for edge in &mut node.edges {
            let Some(dest_namespace) = namespace_of.get(&edge.dest) else {
                continue;
            };
            let covered = mesh.mtls_policies.iter().any(|p| {
                (p.source_namespace.is_empty() || p.source_namespace == node.namespace)
                    && p.dest_namespace == *dest_namespace
            });
            if covered {
                edge.metadata.insert(IS_MTLS, true.into());
            }
        }
    }
}
