//! Ordered graph-mutation stages ("appenders").
//!
//! Each stage mutates the one `TrafficMap` of a request in place: adding or
//! removing nodes and edges, or annotating metadata keys it owns. Stages are
//! stateless between requests, read-only with respect to the resolved
//! options, and run strictly in sequence; later stages depend on the
//! deletions and annotations of earlier ones.
//!
//! Every stage reads its collaborator data from the in-memory mesh snapshot,
//! so a lookup cannot fail at apply time; an absent snapshot section is an
//! empty one. Per-stage policies are documented on each module.

mod dead_node;
mod istio;
mod response_time;
mod security_policy;
mod sidecars_check;
mod unused_node;

use crate::graph::TrafficMap;
use crate::mesh::MeshSnapshot;
use crate::options::{APPENDER_ALL, Options};

/// The closed set of pipeline stages. Construction goes through
/// [`AppenderKind::ORDERED`], which fixes the pipeline order regardless of
/// how a request spells its appender filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppenderKind {
    DeadNode,
    ResponseTime,
    SecurityPolicy,
    UnusedNode,
    Istio,
    SidecarsCheck,
}

impl AppenderKind {
    /// The pipeline order. Dead-node filtering first shrinks the work for
    /// every later stage; unused-node injection runs after filtering and
    /// annotation so an injected node is never annotated as if it carried
    /// traffic; the sidecar check is purely informational and runs last.
    pub const ORDERED: [AppenderKind; 6] = [
        AppenderKind::DeadNode,
        AppenderKind::ResponseTime,
        AppenderKind::SecurityPolicy,
        AppenderKind::UnusedNode,
        AppenderKind::Istio,
        AppenderKind::SidecarsCheck,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            AppenderKind::DeadNode => "deadNode",
            AppenderKind::ResponseTime => "responseTime",
            AppenderKind::SecurityPolicy => "securityPolicy",
            AppenderKind::UnusedNode => "unusedNode",
            AppenderKind::Istio => "istio",
            AppenderKind::SidecarsCheck => "sidecarsCheck",
        }
    }

    /// Accepted short alias in appender filter lists.
    pub const fn alias(self) -> &'static str {
        match self {
            AppenderKind::DeadNode => "dead_node",
            AppenderKind::ResponseTime => "response_time",
            AppenderKind::SecurityPolicy => "security_policy",
            AppenderKind::UnusedNode => "unused_node",
            AppenderKind::Istio => "istio",
            AppenderKind::SidecarsCheck => "sidecars_check",
        }
    }

    /// Whether a lowercased filter list selects this stage.
    pub fn selected(self, csl: &str) -> bool {
        csl == APPENDER_ALL
            || csl.contains(&self.name().to_lowercase())
            || csl.contains(self.alias())
    }

    pub fn apply(self, traffic_map: &mut TrafficMap, options: &Options, mesh: &MeshSnapshot) {
        match self {
            AppenderKind::DeadNode => dead_node::apply(traffic_map, options, mesh),
            AppenderKind::ResponseTime => response_time::apply(traffic_map, options, mesh),
            AppenderKind::SecurityPolicy => security_policy::apply(traffic_map, options, mesh),
            AppenderKind::UnusedNode => unused_node::apply(traffic_map, options, mesh),
            AppenderKind::Istio => istio::apply(traffic_map, options, mesh),
            AppenderKind::SidecarsCheck => sidecars_check::apply(traffic_map, options, mesh),
        }
    }
}

/// Run the resolved stages in sequence over the request's traffic map.
pub fn run_pipeline(traffic_map: &mut TrafficMap, options: &Options, mesh: &MeshSnapshot) {
    for kind in &options.appenders {
        tracing::debug!(appender = kind.name(), "running appender");
        kind.apply(traffic_map, options, mesh);
    }
}
