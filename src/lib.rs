//! zk_compose: a decentralized proof-aggregation service.
//!
//! Five components, built leaves-first: the VK registry ([`vk_registry`]),
//! the proof-system adapters ([`adapters`]), the recursive aggregation
//! engine ([`engine`]), the external-proof sourcing client ([`sourcing`]),
//! and the reward scorer ([`reward`]). [`config`] holds the single
//! configuration record shared across all of them; [`error`] holds the
//! shared error taxonomy.
//!
//! We forbid unsafe throughout the crate.

#![forbid(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod reward;
pub mod sourcing;
pub mod vk_registry;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use adapters::ProofSystem;

/// Field element type used for the public inputs bound into an
/// [`AggregatedProof`]. The choice of curve is cosmetic here — no pairing or
/// folding arithmetic is actually performed over it, see [`engine`] — but a
/// real field type keeps the public-input representation honest rather than
/// falling back to raw bytes.
pub type F = ark_bn254::Fr;

/// Hex-encoded, `ark-serialize`-canonical wire form of `Vec<F>`, used so
/// `public_inputs` round-trips through JSON instead of being dropped.
pub mod public_inputs_wire {
    use super::F;
    use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Canonically serialize each field element, hex-encoding the bytes.
    pub fn encode(values: &[F]) -> Vec<String> {
        values
            .iter()
            .map(|fe| {
                let mut bytes = Vec::new();
                fe.serialize_compressed(&mut bytes).expect("serialize field element");
                hex::encode(bytes)
            })
            .collect()
    }

    /// Inverse of [`encode`]; fails on malformed hex or a malformed field encoding.
    pub fn decode(values: &[String]) -> Result<Vec<F>, String> {
        values
            .iter()
            .map(|s| {
                let bytes = hex::decode(s).map_err(|e| format!("bad public input hex: {e}"))?;
                F::deserialize_compressed(bytes.as_slice()).map_err(|e| format!("bad public input encoding: {e}"))
            })
            .collect()
    }

    pub fn serialize<S: Serializer>(values: &[F], serializer: S) -> Result<S::Ok, S::Error> {
        encode(values).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<F>, D::Error> {
        let hex_strings = Vec::<String>::deserialize(deserializer)?;
        decode(&hex_strings).map_err(serde::de::Error::custom)
    }
}

/// A single component proof produced independently by some other subnet.
/// Immutable once constructed; consumed, never mutated, by the aggregation
/// engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentProof {
    pub subnet_id: u32,
    pub proof_system: ProofSystem,
    /// Hex-encoded SHA-256 digest identifying the VK this proof was produced under.
    pub vk_hash: String,
    pub proof_bytes: Vec<u8>,
    #[serde(with = "public_inputs_wire")]
    pub public_inputs: Vec<F>,
}

impl ComponentProof {
    pub fn new(
        subnet_id: u32,
        proof_system: ProofSystem,
        vk_hash: impl Into<String>,
        proof_bytes: Vec<u8>,
        public_inputs: Vec<F>,
    ) -> Self {
        Self { subnet_id, proof_system, vk_hash: vk_hash.into(), proof_bytes, public_inputs }
    }
}

/// Inputs to one aggregation task. `subnet_ids` is carried alongside
/// `base_proofs` rather than derived from `ComponentProof::subnet_id`
/// because the transport envelope may supply it independently; callers that
/// trust the embedded metadata can simply mirror it.
#[derive(Clone, Debug)]
pub struct AggregationQuery {
    pub base_proofs: Vec<ComponentProof>,
    pub subnet_ids: Vec<u32>,
    pub depth: u8,
}

impl AggregationQuery {
    /// Construct a query, deriving `subnet_ids` from each proof's own
    /// `subnet_id` in order. The common case when the caller trusts the
    /// embedded metadata.
    pub fn new(base_proofs: Vec<ComponentProof>, depth: u8) -> Self {
        let subnet_ids = base_proofs.iter().map(|p| p.subnet_id).collect();
        Self { base_proofs, subnet_ids, depth }
    }

    /// `|set(subnet_ids)|`.
    pub fn unique_subnets(&self) -> usize {
        self.subnet_ids.iter().collect::<HashSet<_>>().len()
    }

    /// `|base_proofs| >= 1 && depth >= 1 && |base_proofs| == |subnet_ids|`.
    pub fn is_well_formed(&self) -> bool {
        !self.base_proofs.is_empty() && self.depth >= 1 && self.base_proofs.len() == self.subnet_ids.len()
    }
}

/// Output of the prover: a versioned binary blob plus the immutable linkage
/// digest bound into its public inputs. See
/// [`engine::AggregatedProof`] for the exact wire layout and
/// [`engine::prove_composition`]/[`engine::verify_composition`] for the
/// prover/verifier contract.
pub use engine::AggregatedProof;

/// A worker's reply to a dispatched [`AggregationQuery`]. `compression_ratio`
/// is the worker's self-reported `sum(|base_proof_i|) / |aggregated_proof|`;
/// the scorer trusts it rather than recomputing it from the proof bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub aggregated_proof: Option<Vec<u8>>,
    pub compression_ratio: f64,
    pub proving_time_seconds: f64,
}

impl WorkerResponse {
    pub fn missing() -> Self {
        Self { aggregated_proof: None, compression_ratio: 0.0, proving_time_seconds: 0.0 }
    }
}

/// A cached VK record. Owned by [`vk_registry`]; exposed here only as a
/// plain data type for callers that want to inspect cache state.
#[derive(Clone, Debug)]
pub struct VkEntry {
    pub subnet_id: u32,
    pub proof_system: ProofSystem,
    pub vk_hash: String,
    pub bytes: Vec<u8>,
    pub fetched_at: std::time::SystemTime,
}

/// Scalar reward produced by [`reward`]; always non-negative, zero iff the
/// aggregated proof failed verification.
pub type RewardScalar = f64;

/// Envelope bundling an [`AggregationQuery`] with a generated identifier and
/// dispatch timestamp, so a coordinator can correlate a dispatched task with
/// the eventual [`WorkerResponse`]s and reward vector.
#[derive(Clone, Debug)]
pub struct TaskCycle {
    pub task_id: String,
    pub query: AggregationQuery,
    pub dispatched_at: std::time::SystemTime,
}

impl TaskCycle {
    pub fn new(task_id: impl Into<String>, query: AggregationQuery) -> Self {
        Self { task_id: task_id.into(), query, dispatched_at: std::time::SystemTime::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proof(subnet_id: u32) -> ComponentProof {
        ComponentProof::new(subnet_id, ProofSystem::Groth16, "deadbeef", vec![1, 2, 3], vec![])
    }

    #[test]
    fn unique_subnets_counts_distinct_ids() {
        let q = AggregationQuery::new(vec![proof(2), proof(2), proof(8)], 1);
        assert_eq!(q.unique_subnets(), 2);
    }

    #[test]
    fn well_formed_requires_nonempty_and_positive_depth() {
        let empty = AggregationQuery::new(vec![], 1);
        assert!(!empty.is_well_formed());

        let zero_depth = AggregationQuery::new(vec![proof(2)], 0);
        assert!(!zero_depth.is_well_formed());

        let ok = AggregationQuery::new(vec![proof(2)], 1);
        assert!(ok.is_well_formed());
    }

    #[test]
    fn public_inputs_round_trip_through_json() {
        let inputs = vec![F::from(7u64), F::from(42u64)];
        let p = ComponentProof::new(2, ProofSystem::Groth16, "deadbeef", vec![1, 2, 3], inputs.clone());

        let json = serde_json::to_string(&p).unwrap();
        let back: ComponentProof = serde_json::from_str(&json).unwrap();

        assert_eq!(back.public_inputs, inputs);
    }

    #[test]
    fn public_inputs_wire_round_trips_directly() {
        let inputs = vec![F::from(1u64), F::from(u64::MAX)];
        let encoded = public_inputs_wire::encode(&inputs);
        let decoded = public_inputs_wire::decode(&encoded).unwrap();
        assert_eq!(decoded, inputs);
    }
}
