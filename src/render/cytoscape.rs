//! Cytoscape document generation.
//!
//! Walks a finished traffic map adding node and edge wrappers, decorating
//! each from the metadata bag; an optional second pass boxes multi-version
//! apps into compound nodes. The document never exposes internal node IDs:
//! element identifiers are content hashes. Output ordering is part of the
//! contract, not cosmetics: identical maps must serialize byte-identically.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use md5::{Digest, Md5};
use serde::Serialize;

use crate::graph::meta::{
    self, DEST_SERVICES, HAS_CB, HAS_MISSING_SC, HAS_VS, IS_DEAD, IS_EGRESS, IS_INACCESSIBLE,
    IS_MISCONFIGURED, IS_MTLS, IS_OUTSIDE, IS_ROOT, IS_UNUSED, MetaValue, PROTOCOL, RATE,
    RATE_3XX, RATE_4XX, RATE_5XX, RATE_OUT, RESPONSE_TIME, TCP_SENT_RATE, TCP_SENT_RATE_OUT,
};
use crate::graph::{Edge, Node, NodeType, TrafficMap};
use crate::options::{GROUP_BY_VERSION, VendorOptions};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub parent: String,

    pub node_type: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub workload: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub app: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub dest_services: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rate: String,
    #[serde(rename = "rate3XX", skip_serializing_if = "String::is_empty")]
    pub rate_3xx: String,
    #[serde(rename = "rate4XX", skip_serializing_if = "String::is_empty")]
    pub rate_4xx: String,
    #[serde(rename = "rate5XX", skip_serializing_if = "String::is_empty")]
    pub rate_5xx: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rate_out: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rate_tcp_sent: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rate_tcp_sent_out: String,
    #[serde(rename = "hasCB", skip_serializing_if = "is_false")]
    pub has_cb: bool,
    #[serde(rename = "hasMissingSC", skip_serializing_if = "is_false")]
    pub has_missing_sc: bool,
    #[serde(rename = "hasVS", skip_serializing_if = "is_false")]
    pub has_vs: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_dead: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_egress: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub is_group: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_inaccessible: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub is_misconfigured: String,
    #[serde(skip_serializing_if = "is_false")]
    pub is_outside: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_root: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_unused: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub rate: String,
    #[serde(rename = "rate3XX", skip_serializing_if = "String::is_empty")]
    pub rate_3xx: String,
    #[serde(rename = "rate4XX", skip_serializing_if = "String::is_empty")]
    pub rate_4xx: String,
    #[serde(rename = "rate5XX", skip_serializing_if = "String::is_empty")]
    pub rate_5xx: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub percent_err: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub percent_rate: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub response_time: String,
    #[serde(rename = "isMTLS", skip_serializing_if = "is_false")]
    pub is_mtls: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub is_unused: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tcp_sent_rate: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeWrapper {
    pub data: NodeData,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeWrapper {
    pub data: EdgeData,
}

#[derive(Debug, Clone, Serialize)]
pub struct Elements {
    pub nodes: Vec<NodeWrapper>,
    pub edges: Vec<EdgeWrapper>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub timestamp: i64,
    pub graph_type: String,
    pub elements: Elements,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn node_hash(id: &str) -> String {
    hex(&Md5::digest(id.as_bytes()))
}

fn edge_hash(from: &str, to: &str, protocol: &str) -> String {
    hex(&Md5::digest(format!("{from}.{to}.{protocol}").as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn format_rate(value: f64) -> String {
    format!("{value:.2}")
}

/// Generate the vendor document for a finished traffic map.
pub fn new_config(traffic_map: &TrafficMap, options: &VendorOptions) -> Config {
    let mut nodes: Vec<NodeWrapper> = Vec::new();
    let mut edges: Vec<EdgeWrapper> = Vec::new();

    build_elements(traffic_map, &mut nodes, &mut edges);

    // Add compound nodes grouping the versions of an app.
    if options.graph_type == crate::graph::GraphType::VersionedApp
        && options.group_by == GROUP_BY_VERSION
    {
        group_by_version(&mut nodes);
    }

    // Sort for deterministic output. Compound nodes must come before the
    // children that reference them.
    nodes.sort_by(|a, b| {
        let (a, b) = (&a.data, &b.data);
        a.namespace
            .cmp(&b.namespace)
            .then_with(|| b.is_group.cmp(&a.is_group))
            .then_with(|| a.app.cmp(&b.app))
            .then_with(|| a.version.cmp(&b.version))
            .then_with(|| a.service.cmp(&b.service))
            .then_with(|| a.workload.cmp(&b.workload))
    });
    edges.sort_by(|a, b| {
        a.data
            .source
            .cmp(&b.data.source)
            .then_with(|| a.data.target.cmp(&b.data.target))
    });

    Config {
        timestamp: options.timestamp,
        graph_type: options.graph_type.as_str().to_string(),
        elements: Elements { nodes, edges },
    }
}

fn build_elements(
    traffic_map: &TrafficMap,
    nodes: &mut Vec<NodeWrapper>,
    edges: &mut Vec<EdgeWrapper>,
) {
    for node in traffic_map.values() {
        let mut data = NodeData {
            id: node_hash(&node.id),
            node_type: node.node_type.as_str().to_string(),
            namespace: node.namespace.clone(),
            workload: node.workload.clone(),
            app: node.app.clone(),
            version: node.version.clone(),
            service: node.service.clone(),
            ..Default::default()
        };
        add_node_telemetry(node, &mut data);

        data.is_dead = meta::flag(&node.metadata, IS_DEAD);
        data.is_root = meta::flag(&node.metadata, IS_ROOT);
        data.is_unused = meta::flag(&node.metadata, IS_UNUSED);
        data.is_inaccessible = meta::flag(&node.metadata, IS_INACCESSIBLE);
        data.is_outside = meta::flag(&node.metadata, IS_OUTSIDE);
        data.is_egress = meta::flag(&node.metadata, IS_EGRESS);
        data.has_cb = meta::flag(&node.metadata, HAS_CB);
        data.has_vs = meta::flag(&node.metadata, HAS_VS);
        data.has_missing_sc = meta::flag(&node.metadata, HAS_MISSING_SC);
        if let Some(value) = node.metadata.get(IS_MISCONFIGURED).and_then(MetaValue::as_str) {
            data.is_misconfigured = value.to_string();
        }
        if let Some(set) = node.metadata.get(DEST_SERVICES).and_then(MetaValue::as_str_set) {
            data.dest_services = set.iter().map(|s| (s.clone(), true)).collect();
        }

        nodes.push(NodeWrapper { data });

        for edge in &node.edges {
            let source_hash = node_hash(&node.id);
            let dest_hash = node_hash(&edge.dest);
            let protocol = edge
                .metadata
                .get(PROTOCOL)
                .and_then(MetaValue::as_str)
                .unwrap_or("");
            let mut data = EdgeData {
                id: edge_hash(&source_hash, &dest_hash, protocol),
                source: source_hash,
                target: dest_hash,
                ..Default::default()
            };
            add_edge_telemetry(edge, &node.metadata, &mut data);
            edges.push(EdgeWrapper { data });
        }
    }
}

fn add_node_telemetry(node: &Node, data: &mut NodeData) {
    let rate = meta::rate(&node.metadata, RATE);
    if rate > 0.0 {
        data.rate = format_rate(rate);

        let rate_3xx = meta::rate(&node.metadata, RATE_3XX);
        let rate_4xx = meta::rate(&node.metadata, RATE_4XX);
        let rate_5xx = meta::rate(&node.metadata, RATE_5XX);
        if rate_3xx > 0.0 {
            data.rate_3xx = format_rate(rate_3xx);
        }
        if rate_4xx > 0.0 {
            data.rate_4xx = format_rate(rate_4xx);
        }
        if rate_5xx > 0.0 {
            data.rate_5xx = format_rate(rate_5xx);
        }
    }

    let rate_out = meta::rate(&node.metadata, RATE_OUT);
    if rate_out > 0.0 {
        data.rate_out = format_rate(rate_out);
    }

    let tcp_sent = meta::rate(&node.metadata, TCP_SENT_RATE);
    if tcp_sent > 0.0 {
        data.rate_tcp_sent = format_rate(tcp_sent);
    }
    let tcp_sent_out = meta::rate(&node.metadata, TCP_SENT_RATE_OUT);
    if tcp_sent_out > 0.0 {
        data.rate_tcp_sent_out = format_rate(tcp_sent_out);
    }
}

fn add_edge_telemetry(edge: &Edge, source_metadata: &meta::Metadata, data: &mut EdgeData) {
    let rate = meta::rate(&edge.metadata, RATE);
    if rate > 0.0 {
        let rate_3xx = meta::rate(&edge.metadata, RATE_3XX);
        let rate_4xx = meta::rate(&edge.metadata, RATE_4XX);
        let rate_5xx = meta::rate(&edge.metadata, RATE_5XX);
        let percent_err = (rate_4xx + rate_5xx) / rate * 100.0;

        data.rate = format_rate(rate);
        if rate_3xx > 0.0 {
            data.rate_3xx = format_rate(rate_3xx);
        }
        if rate_4xx > 0.0 {
            data.rate_4xx = format_rate(rate_4xx);
        }
        if rate_5xx > 0.0 {
            data.rate_5xx = format_rate(rate_5xx);
        }
        if percent_err > 0.0 {
            data.percent_err = format_rate(percent_err);
        }

        if let Some(response_time) = edge.metadata.get(RESPONSE_TIME).and_then(MetaValue::as_f64)
        {
            data.response_time = format_rate(response_time);
        }

        // An edge carrying the full outbound rate of its source has no
        // useful percentage.
        let percent_rate = rate / meta::rate(source_metadata, RATE_OUT) * 100.0;
        if percent_rate < 100.0 {
            data.percent_rate = format_rate(percent_rate);
        }
    } else {
        data.is_unused = meta::flag(source_metadata, IS_UNUSED);
    }

    data.is_mtls = meta::flag(&edge.metadata, IS_MTLS);

    let tcp_sent_rate = meta::rate(&edge.metadata, TCP_SENT_RATE);
    if tcp_sent_rate > 0.0 {
        data.tcp_sent_rate = format_rate(tcp_sent_rate);
    }
}

/// Box the versions of an app under a synthesized compound node.
///
/// App nodes are grouped by (namespace, app); a group spanning more than one
/// distinct version gets a compound parent and each member's `parent` set to
/// it. Sidecar, accessibility and outside flags propagate to the parent by
/// logical OR. Single-version groups are left unwrapped.
fn group_by_version(nodes: &mut Vec<NodeWrapper>) {
    let mut grouped: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, wrapper) in nodes.iter().enumerate() {
        if wrapper.data.node_type == NodeType::App.as_str() {
            let key = format!("box_{}_{}", wrapper.data.namespace, wrapper.data.app);
            grouped.entry(key).or_default().push(i);
        }
    }

    let mut boxes: Vec<NodeWrapper> = Vec::new();
    for (key, members) in grouped {
        let versions: std::collections::BTreeSet<&str> = members
            .iter()
            .map(|&i| nodes[i].data.version.as_str())
            .collect();
        if versions.len() <= 1 {
            continue;
        }

        let box_id = node_hash(&key);
        let mut parent = NodeData {
            id: box_id.clone(),
            node_type: NodeType::App.as_str().to_string(),
            namespace: nodes[members[0]].data.namespace.clone(),
            app: nodes[members[0]].data.app.clone(),
            is_group: GROUP_BY_VERSION.to_string(),
            ..Default::default()
        };

        for &i in &members {
            let member = &mut nodes[i].data;
            member.parent = box_id.clone();
            parent.has_missing_sc |= member.has_missing_sc;
            parent.is_inaccessible |= member.is_inaccessible;
            parent.is_outside |= member.is_outside;
        }

        boxes.push(NodeWrapper { data: parent });
    }

    nodes.append(&mut boxes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::meta::{self, IS_MTLS, IS_UNUSED, RATE, RATE_4XX, RATE_5XX, RATE_OUT};
    use crate::graph::{GraphType, TrafficMap, upsert_node};
    use pretty_assertions::assert_eq;

    fn vendor_options(graph_type: GraphType) -> VendorOptions {
        VendorOptions {
            graph_type,
            group_by: GROUP_BY_VERSION.to_string(),
            timestamp: 1_523_364_075,
        }
    }

    fn edge_between<'a>(config: &'a Config, source_id: &str, dest_id: &str) -> &'a EdgeData {
        let (source, target) = (node_hash(source_id), node_hash(dest_id));
        config
            .elements
            .edges
            .iter()
            .map(|e| &e.data)
            .find(|e| e.source == source && e.target == target)
            .unwrap()
    }

    #[test]
    fn serialization_is_byte_stable() {
        let mut tm = TrafficMap::new();
        for workload in ["a-v1", "b-v1", "c-v1"] {
            upsert_node(&mut tm, "testns", workload, "", "", "", GraphType::Workload).unwrap();
        }
        if let Some(node) = tm.get_mut("wl_testns_a-v1") {
            meta::add_rate(&mut node.metadata, RATE_OUT, 4.0);
            let edge = node.add_edge("wl_testns_b-v1");
            meta::add_rate(&mut edge.metadata, RATE, 3.0);
            let edge = node.add_edge("wl_testns_c-v1");
            meta::add_rate(&mut edge.metadata, RATE, 1.0);
        }

        let first = serde_json::to_string(&new_config(&tm, &vendor_options(GraphType::Workload)))
            .unwrap();
        let second = serde_json::to_string(&new_config(&tm, &vendor_options(GraphType::Workload)))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn percent_err_formula() {
        let mut tm = TrafficMap::new();
        upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload).unwrap();
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();
        if let Some(node) = tm.get_mut("wl_testns_a-v1") {
            meta::add_rate(&mut node.metadata, RATE_OUT, 20.0);
            let edge = node.add_edge("wl_testns_b-v1");
            meta::add_rate(&mut edge.metadata, RATE, 10.0);
            meta::add_rate(&mut edge.metadata, RATE_4XX, 1.0);
            meta::add_rate(&mut edge.metadata, RATE_5XX, 1.0);
        }

        let config = new_config(&tm, &vendor_options(GraphType::Workload));
        let edge = edge_between(&config, "wl_testns_a-v1", "wl_testns_b-v1");
        assert_eq!(edge.rate, "10.00");
        assert_eq!(edge.rate_4xx, "1.00");
        assert_eq!(edge.rate_5xx, "1.00");
        assert_eq!(edge.percent_err, "20.00");
        // 10 of 20 outbound.
        assert_eq!(edge.percent_rate, "50.00");
    }

    #[test]
    fn percent_rate_omitted_for_full_outbound_edge() {
        let mut tm = TrafficMap::new();
        upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload).unwrap();
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();
        if let Some(node) = tm.get_mut("wl_testns_a-v1") {
            meta::add_rate(&mut node.metadata, RATE_OUT, 15.4);
            let edge = node.add_edge("wl_testns_b-v1");
            meta::add_rate(&mut edge.metadata, RATE, 15.4);
        }

        let config = new_config(&tm, &vendor_options(GraphType::Workload));
        let edge = edge_between(&config, "wl_testns_a-v1", "wl_testns_b-v1");
        assert_eq!(edge.percent_rate, "");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("percentRate"));
    }

    #[test]
    fn rate_less_edge_copies_source_unused_flag() {
        let mut tm = TrafficMap::new();
        let node =
            upsert_node(&mut tm, "testns", "idle-v1", "", "", "", GraphType::Workload).unwrap();
        node.metadata.insert(IS_UNUSED, true.into());
        node.add_edge("wl_testns_b-v1");
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();

        let config = new_config(&tm, &vendor_options(GraphType::Workload));
        let edge = edge_between(&config, "wl_testns_idle-v1", "wl_testns_b-v1");
        assert!(edge.is_unused);
        assert_eq!(edge.rate, "");
    }

    #[test]
    fn mtls_flag_is_independent_of_rate() {
        let mut tm = TrafficMap::new();
        upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload).unwrap();
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();
        if let Some(node) = tm.get_mut("wl_testns_a-v1") {
            let edge = node.add_edge("wl_testns_b-v1");
            edge.metadata.insert(IS_MTLS, true.into());
        }

        let config = new_config(&tm, &vendor_options(GraphType::Workload));
        let edge = edge_between(&config, "wl_testns_a-v1", "wl_testns_b-v1");
        assert!(edge.is_mtls);
    }

    #[test]
    fn multi_version_apps_get_one_compound_parent() {
        let mut tm = TrafficMap::new();
        upsert_node(
            &mut tm,
            "testns",
            "ratings-v1",
            "ratings",
            "v1",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();
        upsert_node(
            &mut tm,
            "testns",
            "ratings-v2",
            "ratings",
            "v2",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();
        upsert_node(
            &mut tm,
            "testns",
            "solo-v1",
            "solo",
            "v1",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();

        let config = new_config(&tm, &vendor_options(GraphType::VersionedApp));

        let groups: Vec<&NodeData> = config
            .elements
            .nodes
            .iter()
            .map(|n| &n.data)
            .filter(|n| !n.is_group.is_empty())
            .collect();
        assert_eq!(groups.len(), 1);
        let parent = groups[0];
        assert_eq!(parent.app, "ratings");
        assert_eq!(parent.is_group, "version");

        let children: Vec<&NodeData> = config
            .elements
            .nodes
            .iter()
            .map(|n| &n.data)
            .filter(|n| n.parent == parent.id)
            .collect();
        assert_eq!(children.len(), 2);

        // Groups sort before their children within the namespace.
        assert_eq!(config.elements.nodes[0].data.id, parent.id);

        let solo = config
            .elements
            .nodes
            .iter()
            .map(|n| &n.data)
            .find(|n| n.app == "solo")
            .unwrap();
        assert_eq!(solo.parent, "");
    }

    #[test]
    fn compound_parent_ors_member_flags() {
        let mut tm = TrafficMap::new();
        let node = upsert_node(
            &mut tm,
            "testns",
            "ratings-v1",
            "ratings",
            "v1",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();
        node.metadata.insert(meta::HAS_MISSING_SC, true.into());
        upsert_node(
            &mut tm,
            "testns",
            "ratings-v2",
            "ratings",
            "v2",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();

        let config = new_config(&tm, &vendor_options(GraphType::VersionedApp));
        let parent = config
            .elements
            .nodes
            .iter()
            .map(|n| &n.data)
            .find(|n| !n.is_group.is_empty())
            .unwrap();
        assert!(parent.has_missing_sc);
        assert!(!parent.is_inaccessible);
        assert!(!parent.is_outside);
    }
}
