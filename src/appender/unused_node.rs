//! Unused-node stage: graft configured-but-never-observed destinations onto
//! the graph.
//!
//! Runs after filtering and annotation on purpose: an injected node carries
//! no traffic and must not be annotated as if it did. Policy: every defined
//! workload in a requested namespace with running pods but no node in the
//! map is injected and marked `isUnused` (a defined workload with zero pods
//! is dead, not unused); with service injection on, defined services get the
//! same treatment. Node-detail graphs skip injection entirely.

use crate::graph::meta::IS_UNUSED;
use crate::graph::{Node, TrafficMap};
use crate::mesh::MeshSnapshot;
use crate::options::{GraphKind, Options};

pub(super) fn apply(traffic_map: &mut TrafficMap, options: &Options, mesh: &MeshSnapshot) {
    if options.graph_kind() == GraphKind::Node {
        return;
    }
    let graph_type = options.graph_type();

    for workload in &mesh.workloads {
        if !options.namespaces.contains_key(&workload.namespace) || workload.running_pods == 0 {
            continue;
        }
        let built = Node::new(
            &workload.namespace,
            &workload.name,
            &workload.app,
            &workload.version,
            "",
            graph_type,
        );
        let Ok(mut node) = built else {
            tracing::debug!(
                namespace = %workload.namespace,
                workload = %workload.name,
                "unresolvable workload definition"
            );
            continue;
        };
        node.metadata.insert(IS_UNUSED, true.into());
        traffic_map.entry(node.id.clone()).or_insert(node);
    }

    if options.inject_service_nodes {
        for service in &mesh.services {
            if !options.namespaces.contains_key(&service.namespace) {
                continue;
            }
            let Ok(mut node) = Node::new(&service.namespace, "", "", "", &service.name, graph_type)
            else {
                continue;
            };
            node.metadata.insert(IS_UNUSED, true.into());
            traffic_map.entry(node.id.clone()).or_insert(node);
        }
    }
}
