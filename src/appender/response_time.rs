//! Response-time stage: annotate live edges with latency quantiles.
//!
//! Only samples at the request's configured quantile apply. A sample whose
//! identities do not resolve to an edge of the map (or do not resolve at
//! all) is logged at debug level and skipped; it cannot abort the stage.

use crate::graph::meta::RESPONSE_TIME;
use crate::graph::{TrafficMap, node_id};
use crate::mesh::MeshSnapshot;
use crate::options::Options;
use crate::telemetry::Identity;

pub(super) fn apply(traffic_map: &mut TrafficMap, options: &Options, mesh: &MeshSnapshot) {
    let graph_type = options.graph_type();

    for sample in &mesh.response_times {
        if (sample.quantile - options.response_time_quantile).abs() > 1e-9 {
            continue;
        }

        let Some(source_id) = resolve(&sample.source, graph_type) else {
            continue;
        };
        let Some(dest_id) = resolve(&sample.dest, graph_type) else {
            continue;
        };

        let Some(source) = traffic_map.get_mut(&source_id) else {
            tracing::debug!(source = %source_id, "response time sample for absent node");
            continue;
        };
        for edge in source.edges.iter_mut().filter(|e| e.dest == dest_id) {
            edge.metadata.insert(RESPONSE_TIME, sample.value.into());
        }
    }
}

fn resolve(identity: &Identity, graph_type: crate::graph::GraphType) -> Option<String> {
    match node_id(
        &identity.namespace,
        &identity.workload,
        &identity.app,
        &identity.version,
        &identity.service,
        graph_type,
    ) {
        Ok((id, _)) => Some(id),
        Err(err) => {
            tracing::debug!(error = %err, "unresolvable response time identity");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::meta::{self};
    use crate::graph::{GraphType, upsert_node};
    use crate::mesh::ResponseTimeSample;
    use crate::options::{GraphRequest, build_options};
    use crate::telemetry::test_support::namespace_meta;
    use pretty_assertions::assert_eq;

    fn identity(workload: &str) -> Identity {
        Identity {
            namespace: "testns".to_string(),
            workload: workload.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn annotates_matching_edges_at_the_configured_quantile() {
        let mut tm = TrafficMap::new();
        upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload).unwrap();
        upsert_node(&mut tm, "testns", "b-v1", "", "", "", GraphType::Workload).unwrap();
        if let Some(node) = tm.get_mut("wl_testns_a-v1") {
            node.add_edge("wl_testns_b-v1");
        }

        let mesh = MeshSnapshot {
            response_times: vec![
                ResponseTimeSample {
                    quantile: 0.95,
                    source: identity("a-v1"),
                    dest: identity("b-v1"),
                    value: 31.25,
                },
                // Different quantile: ignored.
                ResponseTimeSample {
                    quantile: 0.5,
                    source: identity("a-v1"),
                    dest: identity("b-v1"),
                    value: 4.0,
                },
            ],
            ..Default::default()
        };
        let options = build_options(
            &GraphRequest {
                namespace: Some("testns".to_string()),
                ..Default::default()
            },
            &namespace_meta(&["testns"]),
        )
        .unwrap();

        apply(&mut tm, &options, &mesh);

        let edge = &tm["wl_testns_a-v1"].edges[0];
        assert_eq!(
            edge.metadata.get(RESPONSE_TIME).and_then(meta::MetaValue::as_f64),
            Some(31.25)
        );
    }

    #[test]
    fn sample_for_absent_edge_is_skipped() {
        let mut tm = TrafficMap::new();
        upsert_node(&mut tm, "testns", "a-v1", "", "", "", GraphType::Workload).unwrap();

        let mesh = MeshSnapshot {
            response_times: vec![ResponseTimeSample {
                quantile: 0.95,
                source: identity("missing-v1"),
                dest: identity("a-v1"),
                value: 9.0,
            }],
            ..Default::default()
        };
        let options = build_options(
            &GraphRequest {
                namespace: Some("testns".to_string()),
                ..Default::default()
            },
            &namespace_meta(&["testns"]),
        )
        .unwrap();

        apply(&mut tm, &options, &mesh);
        assert!(tm["wl_testns_a-v1"].edges.is_empty());
    }
}
