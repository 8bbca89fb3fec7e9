//! Telemetry fold: decomposed rate vectors in, initial traffic map out.
//!
//! The telemetry collaborator hands over samples already decomposed into
//! source/dest identity tuples with a response code and a rate; nothing here
//! parses a query language. Folding goes through the identity scheme, so two
//! partial observations of the same logical entity always merge into one
//! node.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::GraphError;
use crate::graph::meta::{
    self, DEST_SERVICES, IS_INACCESSIBLE, IS_MISCONFIGURED, IS_OUTSIDE, IS_ROOT, MetaValue,
    PROTOCOL, RATE, RATE_3XX, RATE_4XX, RATE_5XX, RATE_OUT, TCP_SENT_RATE, TCP_SENT_RATE_OUT,
};
use crate::graph::{Edge, GraphType, Metadata, Node, NodeType, TrafficMap, node_id, upsert_node};
use crate::options::{NAMESPACE_ISTIO_SYSTEM, Options};

/// One peer of a telemetry sample. Absent labels arrive as empty strings or
/// as the `unknown` sentinel, exactly as the decomposition reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub namespace: String,
    pub workload: String,
    pub app: String,
    pub version: String,
    pub service: String,
}

/// A decomposed request-rate vector element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrafficSample {
    pub source: Identity,
    pub dest: Identity,
    pub response_code: String,
    pub protocol: String,
    pub rate: f64,
}

/// A decomposed TCP byte-rate element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TcpSample {
    pub source: Identity,
    pub dest: Identity,
    pub rate: f64,
}

/// The telemetry input of one graph-generation request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryBatch {
    pub http: Vec<TrafficSample>,
    pub tcp: Vec<TcpSample>,
}

/// Build the initial traffic map for a request.
///
/// Service graphs are built as workload graphs with service injection and
/// condensed to service nodes at the end. A sample with an unresolvable
/// identity tuple fails the whole request: that is malformed upstream data,
/// not something to guess around.
pub fn build_traffic_map(
    batch: &TelemetryBatch,
    options: &Options,
) -> Result<TrafficMap, GraphError> {
    let graph_type = options.graph_type();
    let mut traffic_map = TrafficMap::new();

    for sample in &batch.http {
        if skips_control_plane(options, &sample.source, &sample.dest) {
            continue;
        }
        add_request_sample(&mut traffic_map, sample, options, graph_type)?;
    }
    for sample in &batch.tcp {
        if skips_control_plane(options, &sample.source, &sample.dest) {
            continue;
        }
        add_tcp_sample(&mut traffic_map, sample, graph_type)?;
    }

    if graph_type == GraphType::Service {
        condense_to_services(&mut traffic_map);
    }

    mark_topology(&mut traffic_map, options);
    Ok(traffic_map)
}

/// Control-plane traffic is folded in only when the flag asks for it or the
/// namespace itself was explicitly requested.
fn skips_control_plane(options: &Options, source: &Identity, dest: &Identity) -> bool {
    if options.include_istio {
        return false;
    }
    let excluded = |namespace: &str| {
        namespace == NAMESPACE_ISTIO_SYSTEM
            && !options.namespaces.contains_key(NAMESPACE_ISTIO_SYSTEM)
    };
    if excluded(&source.namespace) || excluded(&dest.namespace) {
        tracing::debug!("skipping control-plane sample");
        return true;
    }
    false
}

fn add_request_sample(
    traffic_map: &mut TrafficMap,
    sample: &TrafficSample,
    options: &Options,
    graph_type: GraphType,
) -> Result<(), GraphError> {
    let source_id = upsert_identity(traffic_map, &sample.source, graph_type)?;
    let dest_id = upsert_identity(traffic_map, &sample.dest, graph_type)?;

    if let Some(source) = traffic_map.get_mut(&source_id) {
        meta::add_rate(&mut source.metadata, RATE_OUT, sample.rate);
    }

    let dest_is_service = traffic_map
        .get(&dest_id)
        .map(|n| n.node_type == NodeType::Service)
        .unwrap_or(false);

    if options.inject_service_nodes && !sample.dest.service.is_empty() && !dest_is_service {
        // Split the hop through the requested service: source -> svc -> dest.
        let (svc_id, svc_type) = node_id(
            &sample.dest.namespace,
            "",
            "",
            "",
            &sample.dest.service,
            graph_type,
        )?;
        let svc = traffic_map.entry(svc_id.clone()).or_insert_with(|| {
            Node::new_explicit(
                svc_id.clone(),
                &sample.dest.namespace,
                "",
                "",
                "",
                &sample.dest.service,
                svc_type,
                graph_type,
            )
        });
        meta::add_rate(&mut svc.metadata, RATE, sample.rate);
        meta::add_rate(&mut svc.metadata, RATE_OUT, sample.rate);
        meta::add_to_set(&mut svc.metadata, DEST_SERVICES, &sample.dest.service);

        if let Some(dest) = traffic_map.get_mut(&dest_id) {
            meta::add_rate(&mut dest.metadata, RATE, sample.rate);
        }

        record_request(traffic_map, &source_id, &svc_id, sample);
        record_request(traffic_map, &svc_id, &dest_id, sample);
    } else {
        if let Some(dest) = traffic_map.get_mut(&dest_id) {
            meta::add_rate(&mut dest.metadata, RATE, sample.rate);
            if !sample.dest.service.is_empty() {
                meta::add_to_set(&mut dest.metadata, DEST_SERVICES, &sample.dest.service);
            }
        }
        record_request(traffic_map, &source_id, &dest_id, sample);
    }
    Ok(())
}

fn record_request(
    traffic_map: &mut TrafficMap,
    source_id: &str,
    dest_id: &str,
    sample: &TrafficSample,
) {
    let Some(edge) = edge_for(traffic_map, source_id, dest_id, &sample.protocol) else {
        return;
    };
    meta::add_rate(&mut edge.metadata, RATE, sample.rate);
    if let Some(bucket) = response_class(&sample.response_code) {
        meta::add_rate(&mut edge.metadata, bucket, sample.rate);
    }
}

fn add_tcp_sample(
    traffic_map: &mut TrafficMap,
    sample: &TcpSample,
    graph_type: GraphType,
) -> Result<(), GraphError> {
    let source_id = upsert_identity(traffic_map, &sample.source, graph_type)?;
    let dest_id = upsert_identity(traffic_map, &sample.dest, graph_type)?;

    if let Some(source) = traffic_map.get_mut(&source_id) {
        meta::add_rate(&mut source.metadata, TCP_SENT_RATE_OUT, sample.rate);
    }
    if let Some(dest) = traffic_map.get_mut(&dest_id) {
        meta::add_rate(&mut dest.metadata, TCP_SENT_RATE, sample.rate);
    }
    if let Some(edge) = edge_for(traffic_map, &source_id, &dest_id, "tcp") {
        meta::add_rate(&mut edge.metadata, TCP_SENT_RATE, sample.rate);
    }
    Ok(())
}

fn upsert_identity(
    traffic_map: &mut TrafficMap,
    identity: &Identity,
    graph_type: GraphType,
) -> Result<String, GraphError> {
    let node = upsert_node(
        traffic_map,
        &identity.namespace,
        &identity.workload,
        &identity.app,
        &identity.version,
        &identity.service,
        graph_type,
    )?;
    Ok(node.id.clone())
}

/// Find the edge for (source, dest, protocol), appending it on first sight.
/// Parallel edges with different protocols stay separate.
fn edge_for<'a>(
    traffic_map: &'a mut TrafficMap,
    source_id: &str,
    dest_id: &str,
    protocol: &str,
) -> Option<&'a mut Edge> {
    let source = traffic_map.get_mut(source_id)?;
    let pos = source.edges.iter().position(|e| {
        e.dest == dest_id
            && e.metadata
                .get(PROTOCOL)
                .and_then(MetaValue::as_str)
                .unwrap_or("")
                == protocol
    });
    let edge = match pos {
        Some(i) => &mut source.edges[i],
        None => {
            let edge = source.add_edge(dest_id);
            if !protocol.is_empty() {
                edge.metadata.insert(PROTOCOL, protocol.into());
            }
            edge
        }
    };
    Some(edge)
}

fn response_class(code: &str) -> Option<&'static str> {
    match code.as_bytes().first() {
        Some(b'3') => Some(RATE_3XX),
        Some(b'4') => Some(RATE_4XX),
        Some(b'5') => Some(RATE_5XX),
        _ => None,
    }
}

/// Reduce a workload graph with injected service nodes to service-level
/// edges: each service -> workload hop is followed one step and lifted onto
/// the service node. The unknown-source node survives so unattributed
/// traffic stays visible.
fn condense_to_services(traffic_map: &mut TrafficMap) {
    fn keep(node: &Node) -> bool {
        matches!(node.node_type, NodeType::Service | NodeType::Unknown)
    }

    let mut lifted: Vec<(String, String, Metadata)> = Vec::new();
    for node in traffic_map.values() {
        if !keep(node) {
            continue;
        }
        for edge in &node.edges {
            let Some(mid) = traffic_map.get(&edge.dest) else {
                continue;
            };
            if keep(mid) {
                continue;
            }
            for hop in &mid.edges {
                if traffic_map.get(&hop.dest).map(keep).unwrap_or(false) {
                    lifted.push((node.id.clone(), hop.dest.clone(), hop.metadata.clone()));
                }
            }
        }
    }

    for (source_id, dest_id, metadata) in lifted {
        let protocol = metadata
            .get(PROTOCOL)
            .and_then(MetaValue::as_str)
            .unwrap_or("")
            .to_string();
        if let Some(edge) = edge_for(traffic_map, &source_id, &dest_id, &protocol) {
            for key in [RATE, RATE_3XX, RATE_4XX, RATE_5XX, TCP_SENT_RATE] {
                if let Some(v) = metadata.get(key).and_then(MetaValue::as_f64) {
                    meta::add_rate(&mut edge.metadata, key, v);
                }
            }
        }
    }

    traffic_map.retain(|_, node| keep(node));
    let kept: BTreeSet<String> = traffic_map.keys().cloned().collect();
    for node in traffic_map.values_mut() {
        node.edges.retain(|e| kept.contains(&e.dest));
    }
}

/// Post-build markers consumed by the serializer: traffic roots, nodes
/// outside the requested namespaces, nodes in inaccessible namespaces, and
/// workloads missing their app/version labeling.
fn mark_topology(traffic_map: &mut TrafficMap, options: &Options) {
    let has_incoming: BTreeSet<String> = traffic_map
        .values()
        .flat_map(|n| n.edges.iter().map(|e| e.dest.clone()))
        .collect();

    for node in traffic_map.values_mut() {
        if !node.edges.is_empty() && !has_incoming.contains(&node.id) {
            node.metadata.insert(IS_ROOT, true.into());
        }
        if node.node_type != NodeType::Unknown && !options.namespaces.contains_key(&node.namespace)
        {
            if options.accessible_namespaces.contains(&node.namespace) {
                node.metadata.insert(IS_OUTSIDE, true.into());
            } else {
                node.metadata.insert(IS_INACCESSIBLE, true.into());
            }
        }
        if node.node_type == NodeType::Workload && (node.app.is_empty() || node.version.is_empty())
        {
            node.metadata.insert(IS_MISCONFIGURED, "labels".into());
        }
    }
}
