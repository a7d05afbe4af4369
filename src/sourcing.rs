//! External-Proof Sourcing Client.
//!
//! Obtains a canonical component proof for an externally declared task id by
//! querying `k` redundant responders and taking the proof accepted by a
//! strict majority. Grounded in the same fan-out shape the
//! pack's network provers use — bounded concurrent requests, a per-call
//! deadline, best-effort cancellation of stragglers once an answer is known
//! — adapted from RPC polling to majority voting over HTTP responders.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use sha2::{Digest, Sha256};

use crate::error::{Result, ZkComposeError};

/// One responder's reply to `request_proof(task_id)`.
#[derive(Clone, Debug)]
pub struct ResponderReply {
    pub proof: Vec<u8>,
    pub proof_system: String,
    pub is_valid: bool,
}

/// A single external responder: `request_proof(task_id) -> { proof,
/// proof_system, is_valid }`. Implemented over HTTP in production; mocked
/// in-memory in tests rather than swapped at the module level.
#[async_trait]
pub trait ResponderClient: Send + Sync {
    async fn request_proof(&self, task_id: &str) -> Result<ResponderReply>;
}

/// Reaches a responder over HTTP, POSTing `{"task_id": ...}` and expecting a
/// JSON body shaped like [`ResponderReply`].
pub struct HttpResponderClient {
    url: String,
    client: reqwest::Client,
}

impl HttpResponderClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }
}

#[derive(serde::Deserialize)]
struct HttpReply {
    proof: String, // hex-encoded
    proof_system: String,
    is_valid: bool,
}

#[async_trait]
impl ResponderClient for HttpResponderClient {
    async fn request_proof(&self, task_id: &str) -> Result<ResponderReply> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "task_id": task_id }))
            .send()
            .await
            .map_err(|e| ZkComposeError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ZkComposeError::Transport(format!("responder returned {}", resp.status())));
        }
        let body: HttpReply = resp.json().await.map_err(|e| ZkComposeError::Transport(e.to_string()))?;
        let proof = hex::decode(&body.proof).map_err(|e| ZkComposeError::MalformedProof(e.to_string()))?;
        Ok(ResponderReply { proof, proof_system: body.proof_system, is_valid: body.is_valid })
    }
}

/// Metadata returned alongside the quorum-selected proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcingMetadata {
    pub proof_system: String,
    pub subnet_id: u32,
    pub consensus_count: usize,
}

/// The sourcing client: `k` responders, a majority threshold, and a
/// per-responder timeout, all configurable.
pub struct SourcingClient {
    responders: Vec<Arc<dyn ResponderClient>>,
    majority: usize,
    timeout: Duration,
}

impl SourcingClient {
    pub fn new(responders: Vec<Arc<dyn ResponderClient>>, majority: u32, timeout: Duration) -> Self {
        Self { responders, majority: majority as usize, timeout }
    }

    /// Fans out to every responder in parallel, groups non-empty, valid
    /// replies by `SHA256(proof)`, and returns the group that reaches
    /// `majority`. Outstanding requests are not explicitly cancelled once a
    /// majority is known — `join_all` still awaits every future — but this
    /// is correctness-neutral: stragglers are discarded, never blocking the
    /// result.
    pub async fn fetch_proof_by_task_id(&self, task_id: &str, subnet_id: u32) -> Result<(Vec<u8>, SourcingMetadata)> {
        let calls = self.responders.iter().map(|responder| {
            let responder = responder.clone();
            let task_id = task_id.to_string();
            let timeout = self.timeout;
            async move {
                match tokio::time::timeout(timeout, responder.request_proof(&task_id)).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(ZkComposeError::Timeout),
                }
            }
        });

        let results = join_all(calls).await;

        let mut groups: HashMap<[u8; 32], (Vec<u8>, String, usize)> = HashMap::new();
        let mut timeouts = 0usize;
        for result in results {
            let reply = match result {
                Ok(reply) if reply.is_valid && !reply.proof.is_empty() => reply,
                Ok(_) => continue,
                Err(ZkComposeError::Timeout) => {
                    timeouts += 1;
                    continue;
                }
                Err(e) => {
                    tracing::debug!(task_id, error = %e, "responder call failed");
                    continue;
                }
            };
            let hash: [u8; 32] = Sha256::digest(&reply.proof).into();
            let entry = groups.entry(hash).or_insert_with(|| (reply.proof.clone(), reply.proof_system.clone(), 0));
            entry.2 += 1;
        }

        if timeouts > 0 {
            tracing::debug!(task_id, timeouts, "some responders missed the per-request deadline");
        }

        let distinct_versions = groups.len();

        // Deterministic tie-breaking: among groups meeting `majority`, prefer
        // the lexicographically smaller proof hash.
        let winner = groups
            .into_iter()
            .filter(|(_, (_, _, count))| *count >= self.majority)
            .min_by_key(|(hash, _)| *hash);

        match winner {
            Some((_, (proof, proof_system, count))) => {
                tracing::info!(task_id, consensus_count = count, "sourcing quorum reached");
                Ok((proof, SourcingMetadata { proof_system, subnet_id, consensus_count: count }))
            }
            None if timeouts == self.responders.len() => {
                tracing::warn!(task_id, timeouts, "all responders timed out");
                Err(ZkComposeError::Timeout)
            }
            None => {
                tracing::warn!(task_id, distinct_versions, "sourcing failed to reach quorum");
                Err(ZkComposeError::ConsensusFailure { distinct_versions })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResponder {
        reply: Option<ResponderReply>,
        delay: Duration,
    }

    #[async_trait]
    impl ResponderClient for FixedResponder {
        async fn request_proof(&self, _task_id: &str) -> Result<ResponderReply> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().ok_or(ZkComposeError::Transport("no reply".into()))
        }
    }

    fn responder(label: &str) -> Arc<dyn ResponderClient> {
        Arc::new(FixedResponder {
            reply: Some(ResponderReply { proof: label.as_bytes().to_vec(), proof_system: "groth16".into(), is_valid: true }),
            delay: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn majority_of_three_out_of_five_wins() {
        // {A, A, A, B, C}
        let responders = vec![responder("alpha"), responder("alpha"), responder("alpha"), responder("beta"), responder("gamma")];
        let client = SourcingClient::new(responders, 3, Duration::from_secs(1));
        let (proof, meta) = client.fetch_proof_by_task_id("task-1", 2).await.unwrap();
        assert_eq!(proof, b"alpha");
        assert_eq!(meta.consensus_count, 3);
    }

    #[tokio::test]
    async fn two_two_one_split_fails_consensus() {
        // {A, A, B, B, C}
        let responders = vec![responder("alpha"), responder("alpha"), responder("beta"), responder("beta"), responder("gamma")];
        let client = SourcingClient::new(responders, 3, Duration::from_secs(1));
        let err = client.fetch_proof_by_task_id("task-1", 2).await.unwrap_err();
        match err {
            ZkComposeError::ConsensusFailure { distinct_versions } => assert_eq!(distinct_versions, 3),
            other => panic!("expected ConsensusFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_responders_are_not_waited_on_past_their_timeout() {
        let fast_majority = vec![responder("alpha"), responder("alpha"), responder("alpha")];
        let slow = Arc::new(FixedResponder {
            reply: Some(ResponderReply { proof: b"beta".to_vec(), proof_system: "groth16".into(), is_valid: true }),
            delay: Duration::from_secs(5),
        });
        let mut responders = fast_majority;
        responders.push(slow);
        responders.push(responder("gamma"));

        let client = SourcingClient::new(responders, 3, Duration::from_millis(50));
        let (proof, meta) = client.fetch_proof_by_task_id("task-1", 2).await.unwrap();
        assert_eq!(proof, b"alpha");
        assert_eq!(meta.consensus_count, 3);
    }

    #[tokio::test]
    async fn invalid_replies_are_excluded_from_grouping() {
        let invalid = Arc::new(FixedResponder {
            reply: Some(ResponderReply { proof: b"alpha".to_vec(), proof_system: "groth16".into(), is_valid: false }),
            delay: Duration::ZERO,
        });
        let responders = vec![responder("alpha"), responder("alpha"), invalid, responder("beta"), responder("gamma")];
        let client = SourcingClient::new(responders, 3, Duration::from_secs(1));
        let err = client.fetch_proof_by_task_id("task-1", 2).await.unwrap_err();
        assert!(matches!(err, ZkComposeError::ConsensusFailure { distinct_versions: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn all_responders_timing_out_surfaces_as_timeout() {
        let slow = || {
            Arc::new(FixedResponder {
                reply: Some(ResponderReply { proof: b"alpha".to_vec(), proof_system: "groth16".into(), is_valid: true }),
                delay: Duration::from_secs(5),
            }) as Arc<dyn ResponderClient>
        };
        let responders = vec![slow(), slow(), slow()];
        let client = SourcingClient::new(responders, 2, Duration::from_millis(50));
        let err = client.fetch_proof_by_task_id("task-1", 2).await.unwrap_err();
        assert!(matches!(err, ZkComposeError::Timeout));
    }
}
