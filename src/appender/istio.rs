//! Istio-config stage: mark nodes covered by mesh routing configuration.
//!
//! `hasCB` when a destination rule carrying a circuit breaker matches the
//! node's backing host, `hasVS` when a virtual service routes one of its
//! hosts. Host matching is short-name based: a bare host matches within the
//! rule's own namespace, `name.namespace[...]` matches across namespaces,
//! and `*` covers the rule's namespace. An absent config section marks
//! nothing.

use crate::graph::meta::{HAS_CB, HAS_VS};
use crate::graph::{Node, TrafficMap};
use crate::mesh::MeshSnapshot;
use crate::options::Options;

pub(super) fn apply(traffic_map: &mut TrafficMap, _options: &Options, mesh: &MeshSnapshot) {
    if mesh.destination_rules.is_empty() && mesh.virtual_services.is_empty() {
        tracing::debug!("no istio config in snapshot");
        return;
    }

    for node in traffic_map.values_mut() {
        for rule in &mesh.destination_rules {
            if rule.has_circuit_breaker && host_covers(&rule.host, &rule.namespace, node) {
                node.metadata.insert(HAS_CB, true.into());
            }
        }
        for vs in &mesh.virtual_services {
            if vs
                .hosts
                .iter()
                .any(|host| host_covers(host, &vs.namespace, node))
            {
                node.metadata.insert(HAS_VS, true.into());
            }
        }
    }
}

fn host_covers(host: &str, config_namespace: &str, node: &Node) -> bool {
    if host == "*" {
        return config_namespace == node.namespace;
    }
    let mut parts = host.split('.');
    let short = parts.next().unwrap_or(host);
    let host_namespace = parts.next().unwrap_or(config_namespace);
    host_namespace == node.namespace && node_hosts(node).contains(&short)
}

/// Host names a node can be addressed by: its service name, or its app label
/// (the conventional service short name for workload and app nodes).
fn node_hosts(node: &Node) -> Vec<&str> {
    [node.service.as_str(), node.app.as_str()]
        .into_iter()
        .filter(|h| !h.is_empty())
        .collect()
}
