//! Resolve one inbound graph request into the immutable options snapshot
//! consumed by the rest of the pipeline.
//!
//! Per-field behavior is deliberately uneven: unparsable scalar fields fall
//! back to their defaults silently, while an explicitly requested namespace
//! that is not accessible is a hard error, never dropped.

pub mod duration;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Deserialize;

use crate::appender::AppenderKind;
use crate::error::GraphError;
use crate::graph::{GraphType, NamespaceInfo};
use crate::mesh::NamespaceMeta;
use crate::options::duration::{now_unix, parse_duration, resolve_namespace_duration};

pub const APPENDER_ALL: &str = "_all_";
pub const GROUP_BY_VERSION: &str = "version";
pub const NAMESPACE_ALL: &str = "all";
pub const NAMESPACE_ISTIO_SYSTEM: &str = "istio-system";
pub const DEFAULT_QUANTILE: f64 = 0.95;

const DEFAULT_DURATION: Duration = Duration::from_secs(600); // 10m
const DEFAULT_GRAPH_TYPE: GraphType = GraphType::Workload;
const DEFAULT_GROUP_BY: &str = GROUP_BY_VERSION;
const DEFAULT_VENDOR: &str = "cytoscape";

/// One inbound graph request. Mirrors the query string of the routing layer
/// (out of scope here): every field arrives as an optional string and
/// unparsable values fall back per field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphRequest {
    pub namespace: Option<String>,
    /// Comma-separated namespace list; overrides `namespace` when set.
    pub namespaces: Option<String>,
    pub app: Option<String>,
    pub service: Option<String>,
    pub version: Option<String>,
    pub workload: Option<String>,
    pub duration: Option<String>,
    pub graph_type: Option<String>,
    pub group_by: Option<String>,
    pub include_istio: Option<String>,
    pub inject_service_nodes: Option<String>,
    pub query_time: Option<String>,
    pub vendor: Option<String>,
    pub appenders: Option<String>,
    pub response_time_quantile: Option<String>,
}

/// Options that apply only to node-detail graphs.
#[derive(Debug, Clone, Default)]
pub struct NodeOptions {
    pub app: String,
    pub service: String,
    pub version: String,
    pub workload: String,
}

/// Options forwarded to the vendor-specific serializers.
#[derive(Debug, Clone)]
pub struct VendorOptions {
    pub graph_type: GraphType,
    pub group_by: String,
    pub timestamp: i64,
}

/// Kind of graph represented by the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Namespace,
    Node,
}

/// All supported graph generation options, resolved once per request and
/// read-only for the rest of the pipeline.
#[derive(Debug, Clone)]
pub struct Options {
    pub accessible_namespaces: BTreeSet<String>,
    pub appenders: Vec<AppenderKind>,
    pub duration: Duration,
    /// Include istio-system services. Ignored for the istio-system namespace
    /// itself.
    pub include_istio: bool,
    /// Inject destination service nodes between source and destination.
    pub inject_service_nodes: bool,
    pub namespaces: BTreeMap<String, NamespaceInfo>,
    /// Unix time in seconds.
    pub query_time: i64,
    pub response_time_quantile: f64,
    pub vendor: String,
    pub node: NodeOptions,
    pub vendor_options: VendorOptions,
}

impl Options {
    pub fn graph_type(&self) -> GraphType {
        self.vendor_options.graph_type
    }

    pub fn graph_kind(&self) -> GraphKind {
        if self.node.app.is_empty()
            && self.node.service.is_empty()
            && self.node.version.is_empty()
            && self.node.workload.is_empty()
        {
            GraphKind::Namespace
        } else {
            GraphKind::Node
        }
    }
}

/// Resolve a request against the accessible-namespace metadata.
pub fn build_options(
    request: &GraphRequest,
    accessible: &[NamespaceMeta],
) -> Result<Options, GraphError> {
    let duration = request
        .duration
        .as_deref()
        .and_then(|s| parse_duration(s).ok())
        .unwrap_or(DEFAULT_DURATION);

    let include_istio = request
        .include_istio
        .as_deref()
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false);

    let mut inject_service_nodes = request
        .inject_service_nodes
        .as_deref()
        .and_then(|s| s.parse::<bool>().ok())
        .unwrap_or(false);

    // An unsupported graph type enumeration is reported, unlike the scalar
    // fields above.
    let graph_type = match request.graph_type.as_deref() {
        None | Some("") => DEFAULT_GRAPH_TYPE,
        Some(s) => s.parse::<GraphType>()?,
    };

    let group_by = match request.group_by.as_deref() {
        None | Some("") => DEFAULT_GROUP_BY.to_string(),
        Some(s) => s.to_string(),
    };

    let query_time = request
        .query_time
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or_else(now_unix);

    let vendor = match request.vendor.as_deref() {
        None | Some("") => DEFAULT_VENDOR.to_string(),
        Some(s) => s.to_string(),
    };

    let response_time_quantile = request
        .response_time_quantile
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(DEFAULT_QUANTILE);

    let accessible_namespaces: BTreeSet<String> =
        accessible.iter().map(|n| n.name.clone()).collect();
    let creation_timestamps: BTreeMap<&str, Option<i64>> = accessible
        .iter()
        .map(|n| (n.name.as_str(), n.creation_timestamp))
        .collect();

    let resolve = |name: &str| NamespaceInfo {
        name: name.to_string(),
        duration: resolve_namespace_duration(
            creation_timestamps.get(name).copied().flatten(),
            duration,
            query_time,
        ),
    };

    let requested_namespace = request.namespace.as_deref().unwrap_or("");
    let requested_namespaces = request.namespaces.as_deref().unwrap_or("");

    let mut namespaces = BTreeMap::new();
    let fetch_all = requested_namespaces == NAMESPACE_ALL
        || (requested_namespaces.is_empty() && requested_namespace == NAMESPACE_ALL);
    if fetch_all {
        for name in &accessible_namespaces {
            // The control-plane namespace only appears on explicit request.
            if name != NAMESPACE_ISTIO_SYSTEM {
                namespaces.insert(name.clone(), resolve(name));
            }
        }
    } else if !requested_namespaces.is_empty() {
        for name in requested_namespaces.split(',') {
            if accessible_namespaces.contains(name) {
                namespaces.insert(name.to_string(), resolve(name));
            } else {
                return Err(GraphError::bad_request(format!(
                    "requested namespace [{name}] is not accessible"
                )));
            }
        }
    } else if !requested_namespace.is_empty() {
        if !accessible_namespaces.contains(requested_namespace) {
            return Err(GraphError::bad_request(format!(
                "requested namespace [{requested_namespace}] is not accessible"
            )));
        }
        namespaces.insert(requested_namespace.to_string(), resolve(requested_namespace));
    }

    // Service graphs require service injection.
    if graph_type == GraphType::Service {
        inject_service_nodes = true;
    }

    Ok(Options {
        accessible_namespaces,
        appenders: parse_appenders(request.appenders.as_deref()),
        duration,
        include_istio,
        inject_service_nodes,
        namespaces,
        query_time,
        response_time_quantile,
        vendor,
        node: NodeOptions {
            app: request.app.clone().unwrap_or_default(),
            service: request.service.clone().unwrap_or_default(),
            version: request.version.clone().unwrap_or_default(),
            workload: request.workload.clone().unwrap_or_default(),
        },
        vendor_options: VendorOptions {
            graph_type,
            group_by,
            timestamp: query_time,
        },
    })
}

/// Select appenders from the case-insensitive comma-separated filter. The
/// filter chooses membership only; the resulting order is always the fixed
/// pipeline order.
fn parse_appenders(csl: Option<&str>) -> Vec<AppenderKind> {
    let csl = match csl {
        Some(s) => s.to_lowercase(),
        None => APPENDER_ALL.to_string(),
    };
    AppenderKind::ORDERED
        .into_iter()
        .filter(|kind| kind.selected(&csl))
        .collect()
}
