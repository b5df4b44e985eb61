//! Sign request tracking for the signing relay.
//!
//! A client asks for one or more messages to be signed, a wallet fetches the
//! request by id and answers with signatures. Answers are checked against the
//! requested messages before anyone waiting on the request is told. Requests
//! expire after a fixed time to live.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use poet_anchor_core::{valid_signature, valid_signatures, Signature};

use crate::error::{NodeError, Result};

/// Random 128-bit request identifier, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A request for signatures over hex-encoded messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignRequest {
    pub id: RequestId,
    /// Whether `messages` is a batch answered with one signature each.
    pub multiple: bool,
    pub messages: Vec<String>,
    /// Opaque caller reference echoed back on creation.
    pub reference: String,
    /// Unix milliseconds.
    pub created_at: u64,
}

/// Sent to whoever is associated with a request once it is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    pub request: SignRequest,
    pub signatures: Vec<Signature>,
}

struct Entry {
    request: SignRequest,
    expires_at: Instant,
    waiter: Option<oneshot::Sender<SignResponse>>,
}

/// Keyed store of open sign requests with TTL eviction.
pub struct SignRequests {
    entries: Mutex<HashMap<RequestId, Entry>>,
    ttl: Duration,
}

impl SignRequests {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a request for a single message.
    pub fn create(&self, message: impl Into<String>, reference: impl Into<String>) -> SignRequest {
        self.insert(vec![message.into()], false, reference.into())
    }

    /// Open a request for a batch of messages.
    pub fn create_multiple(&self, messages: Vec<String>, reference: impl Into<String>) -> SignRequest {
        self.insert(messages, true, reference.into())
    }

    fn insert(&self, messages: Vec<String>, multiple: bool, reference: String) -> SignRequest {
        let request = SignRequest {
            id: RequestId::random(),
            multiple,
            messages,
            reference,
            created_at: now_millis(),
        };
        let mut entries = self.lock();
        evict(&mut entries);
        entries.insert(
            request.id.clone(),
            Entry {
                request: request.clone(),
                expires_at: Instant::now() + self.ttl,
                waiter: None,
            },
        );
        tracing::debug!(id = %request.id, messages = request.messages.len(), multiple, "sign request created");
        request
    }

    /// The live request with this id.
    pub fn lookup(&self, id: &RequestId) -> Option<SignRequest> {
        let mut entries = self.lock();
        evict(&mut entries);
        entries.get(id).map(|e| e.request.clone())
    }

    /// Be told when the request is answered. A later call replaces the
    /// earlier waiter.
    pub fn associate(&self, id: &RequestId) -> Result<oneshot::Receiver<SignResponse>> {
        let mut entries = self.lock();
        evict(&mut entries);
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| NodeError::UnknownRequest(id.clone()))?;
        let (tx, rx) = oneshot::channel();
        entry.waiter = Some(tx);
        Ok(rx)
    }

    /// Check an answer. On success the request is closed and its waiter
    /// notified; on failure nothing changes and `false` is returned.
    pub fn respond(&self, id: &RequestId, signatures: Vec<Signature>) -> Result<bool> {
        let mut entries = self.lock();
        evict(&mut entries);
        let entry = entries
            .get(id)
            .ok_or_else(|| NodeError::UnknownRequest(id.clone()))?;

        let accepted = if entry.request.multiple {
            valid_signatures(&entry.request.messages, &signatures)
        } else {
            match (entry.request.messages.first(), signatures.as_slice()) {
                (Some(message), [signature]) => valid_signature(message, signature),
                _ => false,
            }
        };
        if !accepted {
            tracing::info!(id = %id, "sign response rejected");
            return Ok(false);
        }

        if let Some(entry) = entries.remove(id) {
            tracing::info!(id = %id, signatures = signatures.len(), "sign response accepted");
            if let Some(waiter) = entry.waiter {
                // The waiter may have gone away; the answer is still valid.
                let _ = waiter.send(SignResponse {
                    request: entry.request,
                    signatures,
                });
            }
        }
        Ok(true)
    }

    /// Drop expired requests. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        evict(&mut self.lock())
    }

    /// Number of live requests.
    pub fn len(&self) -> usize {
        let mut entries = self.lock();
        evict(&mut entries);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn evict(entries: &mut HashMap<RequestId, Entry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, e| e.expires_at > now);
    let evicted = before - entries.len();
    if evicted > 0 {
        tracing::debug!(evicted, "sign requests expired");
    }
    evicted
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
