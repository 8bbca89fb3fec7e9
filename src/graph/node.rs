//! Node/edge arena and the deterministic identity scheme.
//!
//! The `TrafficMap` owns every node; edges live in their source node and
//! refer to other nodes by ID rather than by pointer. Node IDs are derived,
//! never assigned by callers, and are the sole merge key for partial
//! telemetry observations of the same logical entity.

use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::graph::meta::Metadata;
use crate::graph::{GraphType, NodeType, UNKNOWN};

/// A vertex of the topology. Identity fields irrelevant to the node type are
/// cleared at construction so that two nodes built from different partial
/// inputs compare field-for-field equal.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub node_type: NodeType,
    pub namespace: String,
    pub workload: String,
    pub app: String,
    pub version: String,
    pub service: String,
    pub edges: Vec<Edge>,
    pub metadata: Metadata,
}

/// A directed edge. Source and dest are keys into the owning `TrafficMap`;
/// parallel edges between the same pair are legitimate and told apart by
/// their protocol metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub source: String,
    pub dest: String,
    pub metadata: Metadata,
}

/// The full topology of one request, keyed by node ID.
pub type TrafficMap = BTreeMap<String, Node>;

impl Node {
    /// Derive the identity for the given tuple and build the node.
    pub fn new(
        namespace: &str,
        workload: &str,
        app: &str,
        version: &str,
        service: &str,
        graph_type: GraphType,
    ) -> Result<Node, GraphError> {
        let (id, node_type) = node_id(namespace, workload, app, version, service, graph_type)?;
        Ok(Node::new_explicit(
            id, namespace, workload, app, version, service, node_type, graph_type,
        ))
    }

    /// Build a node with a precomputed identity, trimming the fields that do
    /// not participate in identity for the node type.
    #[allow(clippy::too_many_arguments)]
    pub fn new_explicit(
        id: String,
        namespace: &str,
        workload: &str,
        app: &str,
        version: &str,
        service: &str,
        node_type: NodeType,
        graph_type: GraphType,
    ) -> Node {
        let mut workload = workload.to_string();
        let mut app = app.to_string();
        let mut version = version.to_string();
        let mut service = service.to_string();

        match node_type {
            NodeType::Workload => {
                // A real app+version labeling stays; it still identifies
                // destination rules and cross-links for this workload.
                if app == UNKNOWN {
                    app.clear();
                }
                if version == UNKNOWN {
                    version.clear();
                }
                service.clear();
            }
            NodeType::App => {
                // A versioned-app node keeps its backing workload name; the
                // app+version pair is backed by that single workload.
                if graph_type != GraphType::VersionedApp {
                    workload.clear();
                    version.clear();
                }
                service.clear();
            }
            NodeType::Service => {
                app.clear();
                workload.clear();
                version.clear();
            }
            NodeType::Unknown => {}
        }

        Node {
            id,
            node_type,
            namespace: namespace.to_string(),
            workload,
            app,
            version,
            service,
            edges: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Append a new outgoing edge and return it. Never deduplicates.
    pub fn add_edge(&mut self, dest: impl Into<String>) -> &mut Edge {
        self.edges.push(Edge {
            source: self.id.clone(),
            dest: dest.into(),
            metadata: Metadata::new(),
        });
        let last = self.edges.len() - 1;
        &mut self.edges[last]
    }
}

/// Derive the (id, node type) pair for an identity tuple.
///
/// Pure and deterministic: identical inputs always yield identical output.
/// A tuple where no field resolves is malformed upstream data and comes back
/// as an invariant violation, never a default.
pub fn node_id(
    namespace: &str,
    workload: &str,
    app: &str,
    version: &str,
    service: &str,
    graph_type: GraphType,
) -> Result<(String, NodeType), GraphError> {
    // The special source node for traffic whose origin cannot be attributed.
    // At most one exists globally.
    if namespace == UNKNOWN && workload == UNKNOWN && app == UNKNOWN && service.is_empty() {
        return Ok(("unknown_source".to_string(), NodeType::Unknown));
    }

    // A request can also target an unresolvable destination, e.g. an ingress
    // path with no matching route. One unknown service per namespace keeps
    // these bad destinations visible.
    if workload == UNKNOWN && app == UNKNOWN && service == UNKNOWN {
        return Ok((format!("svc_{namespace}_unknown"), NodeType::Service));
    }

    let workload_ok = !workload.is_empty() && workload != UNKNOWN;
    let app_ok = !app.is_empty() && app != UNKNOWN;
    let service_ok = !service.is_empty() && service != UNKNOWN;

    let violation = || GraphError::InvariantViolation {
        namespace: namespace.to_string(),
        workload: workload.to_string(),
        app: app.to_string(),
        version: version.to_string(),
        service: service.to_string(),
        graph_type: graph_type.as_str().to_string(),
    };

    if !workload_ok && !app_ok && !service_ok {
        return Err(violation());
    }

    // Workload graph nodes are type workload or service. Service graphs are
    // initially processed as workload graphs and condensed afterwards.
    if matches!(graph_type, GraphType::Workload | GraphType::Service) {
        if !workload_ok && !service_ok {
            return Err(violation());
        }
        if !workload_ok {
            return Ok((format!("svc_{namespace}_{service}"), NodeType::Service));
        }
        return Ok((format!("wl_{namespace}_{workload}"), NodeType::Workload));
    }

    if app_ok {
        // A versioned-app graph keys on the workload: it protects against one
        // app label spanning unrelated workloads. Versionless app graphs key
        // on the label to aggregate versions into one node.
        if graph_type == GraphType::VersionedApp {
            return Ok((format!("vapp_{namespace}_{workload}"), NodeType::App));
        }
        return Ok((format!("app_{namespace}_{app}"), NodeType::App));
    }

    if workload_ok {
        return Ok((format!("wl_{namespace}_{workload}"), NodeType::Workload));
    }

    Ok((format!("svc_{namespace}_{service}"), NodeType::Service))
}

/// Fetch the node for an identity tuple, inserting it on first sight.
#[allow(clippy::too_many_arguments)]
pub fn upsert_node<'a>(
    traffic_map: &'a mut TrafficMap,
    namespace: &str,
    workload: &str,
    app: &str,
    version: &str,
    service: &str,
    graph_type: GraphType,
) -> Result<&'a mut Node, GraphError> {
    let (id, node_type) = node_id(namespace, workload, app, version, service, graph_type)?;
    Ok(traffic_map.entry(id.clone()).or_insert_with(|| {
        Node::new_explicit(
            id, namespace, workload, app, version, service, node_type, graph_type,
        )
    }))
}

/// Remove a node and prune every edge that references it.
pub fn remove_node(traffic_map: &mut TrafficMap, id: &str) {
    traffic_map.remove(id);
    for node in traffic_map.values_mut() {
        node.edges.retain(|e| e.dest != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GRAPH_TYPES: [GraphType; 4] = [
        GraphType::App,
        GraphType::Service,
        GraphType::VersionedApp,
        GraphType::Workload,
    ];

    #[test]
    fn id_is_deterministic() {
        for gt in GRAPH_TYPES {
            let a = node_id("testns", "ratings-v1", "ratings", "v1", "", gt).unwrap();
            let b = node_id("testns", "ratings-v1", "ratings", "v1", "", gt).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn unknown_source_is_singular() {
        for gt in GRAPH_TYPES {
            for version in ["", "unknown", "v1"] {
                let (id, node_type) =
                    node_id("unknown", "unknown", "unknown", version, "", gt).unwrap();
                assert_eq!(id, "unknown_source");
                assert_eq!(node_type, NodeType::Unknown);
            }
        }
    }

    #[test]
    fn unknown_destination_is_per_namespace_service() {
        let (id, node_type) = node_id(
            "testns",
            "unknown",
            "unknown",
            "unknown",
            "unknown",
            GraphType::Workload,
        )
        .unwrap();
        assert_eq!(id, "svc_testns_unknown");
        assert_eq!(node_type, NodeType::Service);
    }

    #[test]
    fn unresolvable_tuple_is_invariant_violation() {
        let err = node_id("testns", "", "", "", "", GraphType::Workload).unwrap_err();
        assert!(matches!(err, GraphError::InvariantViolation { .. }));

        // App resolves but neither workload nor service does: fatal for a
        // workload graph.
        let err = node_id("testns", "", "ratings", "v1", "", GraphType::Workload).unwrap_err();
        assert!(matches!(err, GraphError::InvariantViolation { .. }));
    }

    #[test]
    fn workload_graph_prefers_workload_over_service() {
        let (id, node_type) = node_id(
            "testns",
            "ratings-v1",
            "",
            "",
            "ratings",
            GraphType::Workload,
        )
        .unwrap();
        assert_eq!(id, "wl_testns_ratings-v1");
        assert_eq!(node_type, NodeType::Workload);

        let (id, node_type) =
            node_id("testns", "", "", "", "ratings", GraphType::Service).unwrap();
        assert_eq!(id, "svc_testns_ratings");
        assert_eq!(node_type, NodeType::Service);
    }

    #[test]
    fn app_graph_prefers_app_then_workload_then_service() {
        let (id, node_type) =
            node_id("testns", "ratings-v1", "ratings", "v1", "", GraphType::App).unwrap();
        assert_eq!(id, "app_testns_ratings");
        assert_eq!(node_type, NodeType::App);

        let (id, node_type) =
            node_id("testns", "ratings-v1", "", "", "", GraphType::App).unwrap();
        assert_eq!(id, "wl_testns_ratings-v1");
        assert_eq!(node_type, NodeType::Workload);

        let (id, node_type) = node_id("testns", "", "", "", "ratings", GraphType::App).unwrap();
        assert_eq!(id, "svc_testns_ratings");
        assert_eq!(node_type, NodeType::Service);
    }

    #[test]
    fn versioned_app_keys_on_workload() {
        let (id, node_type) = node_id(
            "testns",
            "ratings-v1",
            "ratings",
            "v1",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();
        assert_eq!(id, "vapp_testns_ratings-v1");
        assert_eq!(node_type, NodeType::App);
    }

    #[test]
    fn service_node_trims_everything_but_service() {
        let node = Node::new(
            "testns",
            "unknown",
            "unknown",
            "unknown",
            "ratings",
            GraphType::Workload,
        )
        .unwrap();
        assert_eq!(node.node_type, NodeType::Service);
        assert_eq!(node.app, "");
        assert_eq!(node.workload, "");
        assert_eq!(node.version, "");
        assert_eq!(node.service, "ratings");
    }

    #[test]
    fn workload_node_keeps_real_labels_and_drops_sentinels() {
        let node = Node::new(
            "testns",
            "ratings-v1",
            "ratings",
            "v1",
            "ratings",
            GraphType::Workload,
        )
        .unwrap();
        assert_eq!(node.app, "ratings");
        assert_eq!(node.version, "v1");
        assert_eq!(node.service, "");

        let node = Node::new(
            "testns",
            "ratings-v1",
            "unknown",
            "unknown",
            "",
            GraphType::Workload,
        )
        .unwrap();
        assert_eq!(node.app, "");
        assert_eq!(node.version, "");
    }

    #[test]
    fn app_node_trims_workload_unless_versioned() {
        let node =
            Node::new("testns", "ratings-v1", "ratings", "v1", "", GraphType::App).unwrap();
        assert_eq!(node.workload, "");
        assert_eq!(node.version, "");

        let node = Node::new(
            "testns",
            "ratings-v1",
            "ratings",
            "v1",
            "",
            GraphType::VersionedApp,
        )
        .unwrap();
        assert_eq!(node.workload, "ratings-v1");
        assert_eq!(node.version, "v1");
    }

    #[test]
    fn trimming_makes_partial_inputs_identical() {
        let a = Node::new(
            "testns",
            "unknown",
            "unknown",
            "unknown",
            "ratings",
            GraphType::Workload,
        )
        .unwrap();
        let b = Node::new("testns", "", "", "", "ratings", GraphType::Workload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn add_edge_never_deduplicates() {
        let mut node =
            Node::new("testns", "ratings-v1", "", "", "", GraphType::Workload).unwrap();
        node.add_edge("wl_testns_reviews-v1");
        node.add_edge("wl_testns_reviews-v1");
        assert_eq!(node.edges.len(), 2);
        assert_eq!(node.edges[0].source, "wl_testns_ratings-v1");
    }

    #[test]
    fn remove_node_prunes_referencing_edges() {
        let mut tm = TrafficMap::new();
        let source = upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload)
            .unwrap()
            .id
            .clone();
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();
        if let Some(node) = tm.get_mut(&source) {
            node.add_edge("wl_testns_b-v1");
        }

        remove_node(&mut tm, "wl_testns_b-v1");
        assert!(!tm.contains_key("wl_testns_b-v1"));
        assert!(tm["wl_testns_a-v1"].edges.is_empty());
    }
}
