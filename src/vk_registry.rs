//! VK Registry.
//!
//! Resolves `(subnet_id, proof_system, vk_hash) -> VK bytes`, backed by an
//! on-disk TTL cache with a content-addressable remote fallback. Mirrors the
//! teacher's `srs_setup.rs` validation discipline (deserialize, check
//! structural invariants, verify a digest) applied to VK bytes instead of
//! SRS powers, and its write-temp-then-rename atomic write pattern.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::adapters::ProofSystem;
use crate::error::{Result, ZkComposeError};

/// Per-attempt deadline for a single `VkFetcher::fetch` call.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Stable, content-addressable cache key for a single VK.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subnet_id: u32,
    pub proof_system: ProofSystem,
    pub vk_hash: String,
}

impl CacheKey {
    pub fn new(subnet_id: u32, proof_system: ProofSystem, vk_hash: impl Into<String>) -> Self {
        Self { subnet_id, proof_system, vk_hash: vk_hash.into() }
    }

    /// `<subnet_id>_<proof_system>_<vk_hash>.vk`.
    fn file_name(&self) -> String {
        format!("{}_{}_{}.vk", self.subnet_id, self.proof_system, self.vk_hash)
    }

    fn path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

/// Remote content-addressable VK source.
///
/// Implemented over `reqwest` in production; mocked in-memory in tests, the
/// same split drawn elsewhere in this crate between a network-backed prover
/// and its in-memory test double.
#[async_trait]
pub trait VkFetcher: Send + Sync {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>>;
}

/// Fetches VK bytes from `{base_url}/{vk_hash}` over HTTP.
pub struct HttpVkFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpVkFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl VkFetcher for HttpVkFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<Vec<u8>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key.vk_hash);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ZkComposeError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ZkComposeError::Transport(format!("VK endpoint returned {}", resp.status())));
        }
        let bytes = resp.bytes().await.map_err(|e| ZkComposeError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Pure freshness check, isolated from real clocks/filesystem so it can be
/// unit tested without flakiness.
pub fn is_fresh(fetched_at: SystemTime, ttl: Duration, now: SystemTime) -> bool {
    match now.duration_since(fetched_at) {
        Ok(age) => age < ttl,
        Err(_) => true, // fetched_at is in the future (clock skew) — treat as fresh
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// VK Registry. One instance is typically shared (via `Arc`) across the
/// process; all internal state is behind async locks, so `&self` suffices.
pub struct VkRegistry {
    cache_dir: PathBuf,
    ttl: Duration,
    fetcher: Arc<dyn VkFetcher>,
    /// Per-key single-flight locks: concurrent callers for the *same* key
    /// serialize; callers for different keys never block each other.
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl VkRegistry {
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration, fetcher: Arc<dyn VkFetcher>) -> Self {
        Self { cache_dir: cache_dir.into(), ttl, fetcher, locks: Mutex::new(HashMap::new()) }
    }

    async fn key_lock(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Cache hit (fresh + hash-valid) short-circuits; otherwise re-fetch,
    /// verify, and atomically persist.
    pub async fn get_vk(&self, subnet_id: u32, proof_system: ProofSystem, vk_hash: &str) -> Result<Vec<u8>> {
        let key = CacheKey::new(subnet_id, proof_system, vk_hash);
        let key_lock = self.key_lock(&key).await;
        let _guard = key_lock.lock().await;

        let path = key.path(&self.cache_dir);
        if let Some(bytes) = self.try_read_cache(&key, &path).await? {
            tracing::debug!(subnet_id, %proof_system, vk_hash, "VK cache hit");
            return Ok(bytes);
        }

        tracing::info!(subnet_id, %proof_system, vk_hash, "VK cache miss, fetching");
        let bytes = self.fetch_with_one_retry(&key).await?;

        let actual_hash = sha256_hex(&bytes);
        if actual_hash != key.vk_hash {
            tracing::error!(subnet_id, %proof_system, vk_hash, "fetched VK failed hash check");
            return Err(ZkComposeError::VkCorrupt {
                subnet_id,
                proof_system,
                vk_hash: vk_hash.to_string(),
            });
        }

        self.write_cache_atomic(&path, &bytes).await?;
        Ok(bytes)
    }

    /// Returns `Some(bytes)` on a fresh, hash-valid cache hit. A present but
    /// stale or corrupt entry is treated as a miss; a corrupt entry is
    /// deleted so it doesn't shadow a future successful fetch.
    async fn try_read_cache(&self, key: &CacheKey, path: &Path) -> Result<Option<Vec<u8>>> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mtime = meta.modified()?;
        if !is_fresh(mtime, self.ttl, SystemTime::now()) {
            tracing::info!(vk_hash = %key.vk_hash, "VK cache expired, refetching");
            return Ok(None);
        }

        let bytes = tokio::fs::read(path).await?;
        if sha256_hex(&bytes) != key.vk_hash {
            tracing::warn!(vk_hash = %key.vk_hash, "cached VK failed hash check, deleting");
            let _ = tokio::fs::remove_file(path).await;
            return Ok(None);
        }
        Ok(Some(bytes))
    }

    /// Remote fetch, retried at most once on transient failure. Each attempt
    /// is bounded by [`FETCH_TIMEOUT`]; an attempt that doesn't finish in
    /// time surfaces as [`ZkComposeError::Timeout`] rather than hanging.
    async fn fetch_with_one_retry(&self, key: &CacheKey) -> Result<Vec<u8>> {
        match self.fetch_once(key).await {
            Ok(bytes) => Ok(bytes),
            Err(first_err) => {
                tracing::warn!(error = %first_err, "VK fetch failed, retrying once");
                self.fetch_once(key).await.map_err(|second_err| ZkComposeError::VkUnavailable {
                    subnet_id: key.subnet_id,
                    proof_system: key.proof_system,
                    vk_hash: key.vk_hash.clone(),
                    reason: second_err.to_string(),
                })
            }
        }
    }

    async fn fetch_once(&self, key: &CacheKey) -> Result<Vec<u8>> {
        match tokio::time::timeout(FETCH_TIMEOUT, self.fetcher.fetch(key)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(subnet_id = key.subnet_id, vk_hash = %key.vk_hash, "VK fetch timed out");
                Err(ZkComposeError::Timeout)
            }
        }
    }

    async fn write_cache_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        let cache_dir = self.cache_dir.clone();
        let bytes = bytes.to_vec();
        let final_path = path.to_path_buf();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&cache_dir)?;
            use std::io::Write;
            tmp.write_all(&bytes)?;
            tmp.persist(&final_path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .expect("cache write task panicked")?;
        Ok(())
    }
}
