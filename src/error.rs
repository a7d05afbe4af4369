//! Crate-wide error taxonomy.
//!
//! Every failure mode named in the design (VK resolution, adapter dispatch,
//! proof generation, sourcing consensus) maps to one variant here. The
//! verifier never surfaces these as `Err` — `engine::verify_composition`
//! always returns `Ok((bool, reason))`; this enum is for the prover, the VK
//! registry, and the sourcing client, whose callers are expected to handle
//! `Result`.

use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ZkComposeError {
    /// Caller supplied an empty proof list, mismatched lengths, or `depth < 1`.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    /// No adapter registered for the requested proof system.
    #[error("unsupported proof system: {0:?}")]
    UnsupportedProofSystem(crate::adapters::ProofSystem),

    /// A component proof failed structural parsing.
    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// Remote VK fetch failed and no valid cache entry exists.
    #[error("VK unavailable for {subnet_id}/{proof_system:?}/{vk_hash}: {reason}")]
    VkUnavailable {
        subnet_id: u32,
        proof_system: crate::adapters::ProofSystem,
        vk_hash: String,
        reason: String,
    },

    /// A fetched VK failed its hash check.
    #[error("VK corrupt for {subnet_id}/{proof_system:?}/{vk_hash}")]
    VkCorrupt {
        subnet_id: u32,
        proof_system: crate::adapters::ProofSystem,
        vk_hash: String,
    },

    /// The native prover reported failure (or a base proof was rejected).
    #[error("proof generation failed: {reason}")]
    ProofGenerationError { reason: String },

    /// The sourcing client could not reach a majority among the responders.
    #[error("sourcing consensus failure: {distinct_versions} distinct proof versions")]
    ConsensusFailure { distinct_versions: usize },

    /// A per-request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// Transport/IO failure talking to a remote endpoint.
    #[error("transport error: {0}")]
    Transport(String),

    /// Local disk I/O failure (cache read/write).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ZkComposeError>;
