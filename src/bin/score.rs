//! CLI front-end for the reward scorer.
//!
//! ```text
//! zkc-score --manifest proofs.json --depth 2 --proof aggregated.bin \
//!            --compression-ratio 2.5
//! ```
//!
//! Prints the scalar reward computed by [`zk_compose::reward::reward`].

use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

use zk_compose::adapters::{AdapterRegistry, ProofSystem};
use zk_compose::config::Config;
use zk_compose::reward::reward;
use zk_compose::{public_inputs_wire, AggregationQuery, ComponentProof, WorkerResponse};

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

#[derive(Deserialize)]
struct ManifestEntry {
    subnet_id: u32,
    proof_system: String,
    vk_hash: String,
    proof_bytes_hex: String,
    #[serde(default)]
    public_inputs_hex: Vec<String>,
}

fn load_manifest(path: &PathBuf) -> anyhow::Result<Vec<ComponentProof>> {
    let text = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("read manifest {}: {e}", path.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("parse manifest: {e}"))?;
    entries
        .into_iter()
        .map(|e| {
            let proof_system = ProofSystem::parse(&e.proof_system)
                .ok_or_else(|| anyhow::anyhow!("unknown proof system `{}`", e.proof_system))?;
            let proof_bytes = hex::decode(&e.proof_bytes_hex).map_err(|err| anyhow::anyhow!("bad proof_bytes_hex: {err}"))?;
            let public_inputs =
                public_inputs_wire::decode(&e.public_inputs_hex).map_err(|err| anyhow::anyhow!("bad public_inputs_hex: {err}"))?;
            Ok(ComponentProof::new(e.subnet_id, proof_system, e.vk_hash, proof_bytes, public_inputs))
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "zkc_score=info,zk_compose=info".into()))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let manifest_path: PathBuf = parse_flag(&args, "--manifest")
        .ok_or_else(|| anyhow::anyhow!("missing required --manifest <path>"))?
        .into();
    let depth: u8 = parse_flag(&args, "--depth")
        .ok_or_else(|| anyhow::anyhow!("missing required --depth <u8>"))?
        .parse()?;
    let proof_path: PathBuf = parse_flag(&args, "--proof")
        .ok_or_else(|| anyhow::anyhow!("missing required --proof <path>"))?
        .into();
    let compression_ratio: f64 = parse_flag(&args, "--compression-ratio").unwrap_or_else(|| "1.0".to_string()).parse()?;

    let base_proofs = load_manifest(&manifest_path)?;
    let query = AggregationQuery::new(base_proofs, depth);

    let aggregated_proof = std::fs::read(&proof_path).map_err(|e| anyhow::anyhow!("read proof {}: {e}", proof_path.display()))?;
    let response = WorkerResponse { aggregated_proof: Some(aggregated_proof), compression_ratio, proving_time_seconds: 0.0 };

    let config = Config::default();
    let adapters = AdapterRegistry::with_defaults();
    let scalar = reward(&config, &adapters, &query, &response);

    info!(reward = scalar, "scored worker response");
    println!("{scalar}");
    Ok(())
}
