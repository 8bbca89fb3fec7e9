//! Topology graph model: graph/node vocabulary, the node/edge arena and the
//! deterministic identity scheme.
//!
//! One `TrafficMap` is built per graph-generation request, mutated in place
//! by the appender pipeline, handed once to a vendor serializer, and
//! discarded. Nothing in this module is shared across requests.

pub mod meta;
pub mod node;

pub use meta::{MetaValue, Metadata};
pub use node::{Edge, Node, TrafficMap, node_id, remove_node, upsert_node};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GraphError;

/// Sentinel label value for a peer that cannot be attributed.
pub const UNKNOWN: &str = "unknown";

/// Aggregation granularity of a generated graph.
///
/// A service graph is processed as a workload graph with service-node
/// injection and condensed to service nodes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphType {
    App,
    Service,
    VersionedApp,
    Workload,
}

impl GraphType {
    pub const fn as_str(self) -> &'static str {
        match self {
            GraphType::App => "app",
            GraphType::Service => "service",
            GraphType::VersionedApp => "versionedApp",
            GraphType::Workload => "workload",
        }
    }
}

impl FromStr for GraphType {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, GraphError> {
        match s {
            "app" => Ok(GraphType::App),
            "service" => Ok(GraphType::Service),
            "versionedApp" => Ok(GraphType::VersionedApp),
            "workload" => Ok(GraphType::Workload),
            other => Err(GraphError::bad_request(format!(
                "unsupported graph type [{other}]"
            ))),
        }
    }
}

impl fmt::Display for GraphType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a single vertex in the traffic map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    App,
    Service,
    Unknown,
    Workload,
}

impl NodeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::App => "app",
            NodeType::Service => "service",
            NodeType::Unknown => "unknown",
            NodeType::Workload => "workload",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-namespace resolved query window. Computed once by the options
/// resolver and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub duration: Duration,
}
