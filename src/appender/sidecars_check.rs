//! Sidecar-presence stage.
//!
//! Purely informational and independent of traffic state, so it runs last:
//! a node whose backing workload is reported without an injected sidecar is
//! marked `hasMissingSC`. An absent workload section marks nothing.

use std::collections::BTreeSet;

use crate::graph::TrafficMap;
use crate::graph::meta::HAS_MISSING_SC;
use crate::mesh::MeshSnapshot;
use crate::options::Options;

pub(super) fn apply(traffic_map: &mut TrafficMap, _options: &Options, mesh: &MeshSnapshot) {
    let missing: BTreeSet<(&str, &str)> = mesh
        .workloads
        .iter()
        .filter(|w| w.missing_sidecar)
        .map(|w| (w.namespace.as_str(), w.name.as_str()))
        .collect();
    if missing.is_empty() {
        return;
    }

    for node in traffic_map.values_mut() {
        if node.workload.is_empty() {
            continue;
        }
        if missing.contains(&(node.namespace.as_str(), node.workload.as_str())) {
            node.metadata.insert(HAS_MISSING_SC, true.into());
        }
    }
}
