//! Reward Scorer.
//!
//! A pure function of `(query, response)`: re-verifies the worker's
//! aggregated proof through the recursive aggregation engine and applies a
//! depth/succinctness/cross-subnet multiplier stack. No network or disk
//! access; every VK needed to verify was already resolved by the time a
//! query reaches this module.

use crate::adapters::AdapterRegistry;
use crate::config::Config;
use crate::engine::verify_composition;
use crate::{AggregationQuery, RewardScalar, WorkerResponse};

/// Zero iff the response is missing or its aggregated proof fails
/// verification; otherwise `1.0` scaled by the depth, succinctness, and
/// cross-subnet multipliers, which are independent and multiplicative.
///
/// The depth multiplier is deliberately piecewise and preserves a
/// discontinuity between `depth=2` (1.5x) and `depth=3` (2.0x) in the
/// reference scoring table; it is not smoothed out here.
pub fn reward(config: &Config, adapters: &AdapterRegistry, query: &AggregationQuery, response: &WorkerResponse) -> RewardScalar {
    let Some(aggregated_proof_bytes) = response.aggregated_proof.clone() else {
        return 0.0;
    };
    let aggregated_proof = crate::engine::AggregatedProof::from_bytes(aggregated_proof_bytes);

    let (ok, _reason) = verify_composition(adapters, &aggregated_proof, &query.base_proofs, &query.subnet_ids, query.depth);
    if !ok {
        return 0.0;
    }

    let mut score = 1.0_f64;

    score *= depth_multiplier(config, query.depth);

    if response.compression_ratio > config.compression_bonus_threshold {
        score *= config.compression_bonus_multiplier;
    }

    if query.unique_subnets() >= 2 {
        score *= config.cross_subnet_multiplier;
    }

    score
}

/// `depth=1 -> 1x`, `depth=2 -> 1.5x`, `depth>=3 -> min(2.0 + 0.5*(depth-3), cap)`.
fn depth_multiplier(config: &Config, depth: u8) -> f64 {
    match depth {
        0 => 0.0, // unreachable: AggregationQuery::is_well_formed rejects depth 0
        1 => 1.0,
        2 => 1.5,
        d => {
            let raw = 2.0 + 0.5 * (d as f64 - 3.0);
            raw.min(config.depth_bonus_cap)
        }
    }
}

/// Broadcasts [`reward`] over a response vector in worker-dispatch order.
pub fn get_rewards(
    config: &Config,
    adapters: &AdapterRegistry,
    query: &AggregationQuery,
    responses: &[WorkerResponse],
) -> Vec<RewardScalar> {
    responses.iter().map(|r| reward(config, adapters, query, r)).collect()
}
