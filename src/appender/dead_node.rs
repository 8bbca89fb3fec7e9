//! Dead-node stage: prune nodes with no backing running workload.
//!
//! Policy: a node naming a workload the cluster does not define, with no
//! observed traffic, is removed together with every edge pointing at it. A
//! node whose workload exists but has zero running pods stays and is marked
//! `isDead`. A rate-less service node survives only when its service is
//! actually defined. The focal node of a node-detail graph is never pruned.
//! An absent workload/service section means nothing is known to be dead.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::meta::{self, IS_DEAD, RATE, RATE_OUT, TCP_SENT_RATE, TCP_SENT_RATE_OUT};
use crate::graph::{Node, NodeType, TrafficMap, remove_node};
use crate::mesh::MeshSnapshot;
use crate::options::{GraphKind, NodeOptions, Options};

pub(super) fn apply(traffic_map: &mut TrafficMap, options: &Options, mesh: &MeshSnapshot) {
    let workloads: BTreeMap<(&str, &str), u32> = mesh
        .workloads
        .iter()
        .map(|w| ((w.namespace.as_str(), w.name.as_str()), w.running_pods))
        .collect();
    let services: BTreeSet<(&str, &str)> = mesh
        .services
        .iter()
        .map(|s| (s.namespace.as_str(), s.name.as_str()))
        .collect();

    let keep_focal = options.graph_kind() == GraphKind::Node;
    let mut doomed: Vec<String> = Vec::new();

    for node in traffic_map.values_mut() {
        if keep_focal && is_focal(node, &options.node) {
            continue;
        }
        match node.node_type {
            NodeType::Unknown => {}
            NodeType::Service => {
                if has_traffic(node) {
                    continue;
                }
                if !services.contains(&(node.namespace.as_str(), node.service.as_str())) {
                    doomed.push(node.id.clone());
                }
            }
            NodeType::Workload | NodeType::App => {
                // App aggregates without a backing workload name cannot be
                // checked against the cluster.
                if node.workload.is_empty() {
                    continue;
                }
                match workloads.get(&(node.namespace.as_str(), node.workload.as_str())) {
                    None => {
                        if !has_traffic(node) {
                            doomed.push(node.id.clone());
                        }
                    }
                    Some(0) => {
                        node.metadata.insert(IS_DEAD, true.into());
                    }
                    Some(_) => {}
                }
            }
        }
    }

    for id in doomed {
        tracing::debug!(node = %id, "removing dead node");
        remove_node(traffic_map, &id);
    }
}

fn has_traffic(node: &Node) -> bool {
    meta::rate(&node.metadata, RATE) > 0.0
        || meta::rate(&node.metadata, RATE_OUT) > 0.0
        || meta::rate(&node.metadata, TCP_SENT_RATE) > 0.0
        || meta::rate(&node.metadata, TCP_SENT_RATE_OUT) > 0.0
}

fn is_focal(node: &Node, requested: &NodeOptions) -> bool {
    if !requested.workload.is_empty() && node.workload == requested.workload {
        return true;
    }
    if !requested.service.is_empty() && node.service == requested.service {
        return true;
    }
    !requested.app.is_empty()
        && node.app == requested.app
        && (requested.version.is_empty() || node.version == requested.version)
}
