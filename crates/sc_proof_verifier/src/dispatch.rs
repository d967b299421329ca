//! Result dispatch
//!
//! Applies resolved verdicts to the rest of the node through a
//! [`VerificationListener`], then records them in the result cache and the
//! statistics. Cache and counters are only touched after the listener has been
//! told, so a verdict that was never delivered never lands in the cache.

use crate::batch::VerificationResult;
use crate::cache::BoundedCache;
use crate::input::RequestId;
use crate::queue::RequestSet;
use crate::stats::{StatsCounters, VerifierStats};
use crate::types::{Hash256, NodeId, VerifiedSubject};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// DoS score reported for an invalid proof
pub const INVALID_PROOF_DOS_SCORE: u32 = 100;

/// Reject reason for a certificate whose proof failed
pub const REJECT_CERT_PROOF: &str = "bad-sc-cert-proof";

/// Reject reason for a transaction with a failed CSW proof
pub const REJECT_CSW_PROOF: &str = "bad-csw-proof";

/// Final verdict delivered to the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationOutcome {
    Verified,
    Failed,
}

/// Validation details accompanying an outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationState {
    reject_reason: Option<String>,
    dos_score: u32,
}

impl ValidationState {
    pub fn valid() -> Self {
        Self::default()
    }

    pub fn invalid(dos_score: u32, reason: impl Into<String>) -> Self {
        Self {
            reject_reason: Some(reason.into()),
            dos_score,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.reject_reason.is_none()
    }

    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// Misbehaviour score to charge the originating peer
    pub fn dos_score(&self) -> u32 {
        self.dos_score
    }
}

/// Receiver of verification outcomes: the mempool and peer layer.
///
/// Called from the driver thread with the queue and cache unlocked, so
/// implementations may enqueue, discard or pause. They must not run a cycle
/// or reset the verifier.
pub trait VerificationListener: Send + Sync {
    fn on_proof_verified(
        &self,
        subject: VerifiedSubject,
        origin: Option<NodeId>,
        outcome: VerificationOutcome,
        state: ValidationState,
    );
}

/// Cached verdict, ordered by resolution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CachedVerdict {
    /// Resolution time, milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub result: VerificationResult,
}

pub(crate) struct ResultDispatcher {
    listener: Arc<dyn VerificationListener>,
    cache: Mutex<BoundedCache<Hash256, CachedVerdict>>,
    stats: StatsCounters,
}

impl ResultDispatcher {
    pub(crate) fn new(listener: Arc<dyn VerificationListener>, cache_capacity: usize) -> Self {
        Self {
            listener,
            cache: Mutex::new(BoundedCache::new(cache_capacity)),
            stats: StatsCounters::default(),
        }
    }

    pub(crate) fn cached(&self, hash: &Hash256) -> Option<CachedVerdict> {
        self.cache.lock().try_get(hash).copied()
    }

    pub(crate) fn is_cached(&self, hash: &Hash256) -> bool {
        self.cache.lock().contains(hash)
    }

    pub(crate) fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    pub(crate) fn stats(&self) -> VerifierStats {
        self.stats.snapshot()
    }

    pub(crate) fn reset_stats(&self) {
        self.stats.reset();
    }

    pub(crate) fn record_removed_from_queue(&self, n: usize) {
        self.stats.add_removed_from_queue(n as u64);
    }

    pub(crate) fn record_discarded(&self, n: usize) {
        self.stats.add_discarded(n as u64);
    }

    pub(crate) fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Deliver the verdicts of every entry in `resolved`; returns the number of
    /// certificates and transactions dispatched
    pub(crate) fn dispatch(
        &self,
        resolved: RequestSet,
        results: &BTreeMap<RequestId, VerificationResult>,
    ) -> usize {
        let mut dispatched = 0;

        for request in resolved.certs() {
            let id = RequestId::Cert(request.cert_hash);
            let result = results
                .get(&id)
                .copied()
                .unwrap_or(VerificationResult::Unknown);
            let subject = VerifiedSubject::Certificate(Arc::clone(&request.certificate));
            if self.deliver(subject, request.cert_hash, request.origin, result, REJECT_CERT_PROOF) {
                self.stats.record_cert(result == VerificationResult::Passed);
                dispatched += 1;
            }
        }

        for (tx_hash, group) in resolved.csw_groups() {
            let Some(first) = group.values().next() else {
                continue;
            };
            let result = VerificationResult::combine(group.values().map(|request| {
                results
                    .get(&RequestId::Csw {
                        tx_hash: *tx_hash,
                        position: request.position,
                    })
                    .copied()
                    .unwrap_or(VerificationResult::Unknown)
            }));
            let subject = VerifiedSubject::Transaction(Arc::clone(&first.transaction));
            if self.deliver(subject, *tx_hash, first.origin, result, REJECT_CSW_PROOF) {
                self.stats.record_csw(result == VerificationResult::Passed);
                dispatched += 1;
            }
        }

        dispatched
    }

    fn deliver(
        &self,
        subject: VerifiedSubject,
        hash: Hash256,
        origin: Option<NodeId>,
        result: VerificationResult,
        reject_reason: &str,
    ) -> bool {
        let (outcome, state) = match result {
            VerificationResult::Passed => (VerificationOutcome::Verified, ValidationState::valid()),
            VerificationResult::Failed => (
                VerificationOutcome::Failed,
                ValidationState::invalid(INVALID_PROOF_DOS_SCORE, reject_reason),
            ),
            VerificationResult::Unknown => {
                tracing::error!(%hash, "Unresolved proof reached dispatch, dropping it");
                return false;
            }
        };

        tracing::debug!(%hash, ?outcome, ?origin, "Dispatching proof verification result");
        self.listener.on_proof_verified(subject, origin, outcome, state);

        self.cache.lock().insert(
            hash,
            CachedVerdict {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                result,
            },
        );
        true
    }
}
