//! Point-in-time collaborator inputs.
//!
//! The cluster and telemetry clients are external collaborators; what the
//! core consumes is a snapshot document with one section per collaborator
//! contract. Appender stages read only their own section, and a section that
//! is absent acts as an empty one.

use serde::Deserialize;

use crate::telemetry::Identity;

/// Namespace metadata from the cluster collaborator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceMeta {
    pub name: String,
    /// Unix seconds; absent when the collaborator cannot date the namespace.
    #[serde(default)]
    pub creation_timestamp: Option<i64>,
}

/// A workload definition with its labels and pod state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkloadDef {
    pub namespace: String,
    pub name: String,
    pub app: String,
    pub version: String,
    pub running_pods: u32,
    pub missing_sidecar: bool,
}

/// A defined service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceDef {
    pub namespace: String,
    pub name: String,
}

/// A virtual service, reduced to the hosts it routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualServiceDef {
    pub namespace: String,
    pub hosts: Vec<String>,
}

/// A destination rule, reduced to what the istio stage inspects.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DestinationRuleDef {
    pub namespace: String,
    pub host: String,
    pub has_circuit_breaker: bool,
}

/// A namespace pair covered by a mutual-TLS policy. An empty source
/// namespace covers any source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MtlsPolicyDef {
    pub source_namespace: String,
    pub dest_namespace: String,
}

/// One response-time observation for an edge, at a given quantile.
/// Milliseconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseTimeSample {
    pub quantile: f64,
    pub source: Identity,
    pub dest: Identity,
    pub value: f64,
}

/// The mesh object snapshot handed to the appender pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeshSnapshot {
    pub workloads: Vec<WorkloadDef>,
    pub services: Vec<ServiceDef>,
    pub virtual_services: Vec<VirtualServiceDef>,
    pub destination_rules: Vec<DestinationRuleDef>,
    pub mtls_policies: Vec<MtlsPolicyDef>,
    pub response_times: Vec<ResponseTimeSample>,
}
