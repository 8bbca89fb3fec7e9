//! meshmap renders live service-mesh traffic as a topology graph document.
//!
//! The CLI stands in for the HTTP routing layer: the graph request arrives
//! as a JSON document (the query-string analogue), collaborator data as
//! snapshot files, and the vendor document is written to a file.
//!
//! Exit codes follow the two core error classes: 2 for a bad request, 3 for
//! an invariant violation in upstream data (logged with full context), 1 for
//! anything else.

use anyhow::Context;
use clap::{Parser, Subcommand};

mod appender;
mod error;
mod graph;
mod mesh;
mod options;
mod render;
mod telemetry;

pub type Result<T> = anyhow::Result<T>;

use crate::error::GraphError;

#[derive(Parser)]
#[command(name = "meshmap")]
#[command(about = "Service mesh topology graph generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a graph document from a request plus collaborator snapshots.
    Graph {
        /// Graph request (JSON).
        #[arg(long)]
        request: String,

        /// Accessible namespaces with creation timestamps (JSON list).
        #[arg(long)]
        namespaces: String,

        /// Decomposed telemetry samples (JSON).
        #[arg(long)]
        traffic: String,

        /// Mesh object snapshot for the appender stages (JSON).
        #[arg(long)]
        mesh: String,

        #[arg(short = 'o', long)]
        out: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()) {
        let code = match err.downcast_ref::<GraphError>() {
            Some(GraphError::BadRequest(_)) => 2,
            Some(violation @ GraphError::InvariantViolation { .. }) => {
                tracing::error!(%violation, "malformed upstream data");
                3
            }
            None => 1,
        };
        eprintln!("Error: {err:#}");
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Commands::Graph {
            request,
            namespaces,
            traffic,
            mesh,
            out,
        } => {
            let request: options::GraphRequest = read_json(&request)?;
            let accessible: Vec<crate::mesh::NamespaceMeta> = read_json(&namespaces)?;
            let batch: telemetry::TelemetryBatch = read_json(&traffic)?;
            let snapshot: crate::mesh::MeshSnapshot = read_json(&mesh)?;

            let resolved = options::build_options(&request, &accessible)?;
            let mut traffic_map = telemetry::build_traffic_map(&batch, &resolved)?;
            appender::run_pipeline(&mut traffic_map, &resolved, &snapshot);
            let document = render::render(&traffic_map, &resolved)?;

            std::fs::write(&out, serde_json::to_string_pretty(&document)?)?;
            println!("Wrote {}", out);
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path))
}
