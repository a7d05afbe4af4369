//! The crate's single configuration record.
//!
//! Built once at process startup (from a TOML file, environment, or
//! hardcoded in tests) and passed by reference into every component.
//! Nothing in this crate mutates configuration after construction.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default state-directory-relative path for the VK cache.
fn default_vk_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("zk_compose")
        .join("vks")
}

/// Central configuration record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding cached VK files, one per `(subnet_id, proof_system, vk_hash)`.
    pub vk_cache_dir: PathBuf,
    /// How long a cached VK is trusted before being re-fetched.
    pub vk_cache_ttl_seconds: u64,
    /// Number of external responders queried by the sourcing client.
    pub sn_sourcing_k: u32,
    /// Minimum identical responses required for sourcing consensus.
    pub sn_sourcing_majority: u32,
    /// Per-responder timeout for the sourcing client.
    pub sn_sourcing_timeout_seconds: u32,
    /// Cap on the depth-based reward multiplier.
    pub depth_bonus_cap: f64,
    /// Compression ratio strictly above which the succinctness bonus applies.
    pub compression_bonus_threshold: f64,
    /// Multiplier applied when the succinctness bonus triggers.
    pub compression_bonus_multiplier: f64,
    /// Multiplier applied when a query spans two or more distinct subnets.
    pub cross_subnet_multiplier: f64,
}

impl Config {
    /// VK cache TTL as a [`Duration`].
    pub fn vk_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.vk_cache_ttl_seconds)
    }

    /// Per-responder sourcing timeout as a [`Duration`].
    pub fn sourcing_timeout(&self) -> Duration {
        Duration::from_secs(self.sn_sourcing_timeout_seconds as u64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vk_cache_dir: default_vk_cache_dir(),
            vk_cache_ttl_seconds: 86_400,
            sn_sourcing_k: 5,
            sn_sourcing_majority: 3,
            sn_sourcing_timeout_seconds: 30,
            depth_bonus_cap: 5.0,
            compression_bonus_threshold: 2.0,
            compression_bonus_multiplier: 1.5,
            cross_subnet_multiplier: 2.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_majority_is_floor_k_over_2_plus_1() {
        let cfg = Config::default();
        assert_eq!(cfg.sn_sourcing_majority, cfg.sn_sourcing_k / 2 + 1);
    }

    #[test]
    fn durations_convert_from_seconds() {
        let cfg = Config::default();
        assert_eq!(cfg.vk_cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(cfg.sourcing_timeout(), Duration::from_secs(30));
    }
}
