//! CLI front-end for the recursive aggregation engine's prover.
//!
//! Reads component proofs from a small JSON manifest and writes an
//! aggregated proof file in the versioned `ZKCMPv1` binary format (see
//! `engine::AggregatedProof`).
//!
//! ```text
//! zkc-aggregate --manifest proofs.json --depth 2 --out aggregated.bin
//! ```
//!
//! Manifest shape (one entry per component proof):
//! ```json
//! [
//!   { "subnet_id": 2, "proof_system": "groth16", "vk_hash": "...", "proof_bytes_hex": "..." }
//! ]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use zk_compose::adapters::{AdapterRegistry, ProofSystem};
use zk_compose::config::Config;
use zk_compose::engine::prove_composition;
use zk_compose::vk_registry::{HttpVkFetcher, VkRegistry};
use zk_compose::{public_inputs_wire, ComponentProof};

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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "zkc_aggregate=info,zk_compose=info".into()))
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
    let out_path: PathBuf = parse_flag(&args, "--out").unwrap_or_else(|| "aggregated.bin".to_string()).into();
    let vk_endpoint = parse_flag(&args, "--vk-endpoint").unwrap_or_else(|| "https://vk.example.invalid".to_string());

    let config = Config::default();
    let base_proofs = load_manifest(&manifest_path)?;
    let subnet_ids: Vec<u32> = base_proofs.iter().map(|p| p.subnet_id).collect();

    let adapters = AdapterRegistry::with_defaults();
    let registry = VkRegistry::new(
        config.vk_cache_dir.clone(),
        config.vk_cache_ttl(),
        Arc::new(HttpVkFetcher::new(vk_endpoint)) as Arc<_>,
    );

    info!(num_proofs = base_proofs.len(), depth, "starting aggregation");
    let (aggregated, proving_time) = prove_composition(&adapters, &registry, &base_proofs, &subnet_ids, depth).await?;
    std::fs::write(&out_path, aggregated.as_bytes())?;
    info!(out = %out_path.display(), proving_time_seconds = proving_time, "wrote aggregated proof");

    Ok(())
}
