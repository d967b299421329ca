//! Pending and in-flight proof requests
//!
//! Two independently locked containers:
//! - the pending queue, where producers enqueue (`cs_asyncQueue` in node terms)
//! - the in-flight batch, moved out of the pending queue for verification
//!
//! [`AsyncProofQueue::drain_into_in_flight`] is the only operation taking both
//! locks, always pending first, so the order cannot invert. Verification runs
//! with neither lock held.

use crate::input::{CertRequest, CswRequest, RequestId, VerificationRequest};
use crate::types::Hash256;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Certificate and CSW requests keyed by identity
#[derive(Debug, Clone, Default)]
pub struct RequestSet {
    certs: BTreeMap<Hash256, Arc<CertRequest>>,
    csws: BTreeMap<Hash256, BTreeMap<u32, Arc<CswRequest>>>,
}

impl RequestSet {
    pub fn cert_count(&self) -> usize {
        self.certs.len()
    }

    /// Number of transactions, not CSW inputs
    pub fn csw_tx_count(&self) -> usize {
        self.csws.len()
    }

    /// Total number of single-proof requests
    pub fn request_count(&self) -> usize {
        self.certs.len() + self.csws.values().map(BTreeMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty() && self.csws.is_empty()
    }

    pub fn certs(&self) -> impl Iterator<Item = &Arc<CertRequest>> {
        self.certs.values()
    }

    /// CSW requests grouped by transaction hash
    pub fn csw_groups(&self) -> impl Iterator<Item = (&Hash256, &BTreeMap<u32, Arc<CswRequest>>)> {
        self.csws.iter()
    }

    /// Flatten into single-proof requests
    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.certs
            .values()
            .cloned()
            .map(VerificationRequest::Cert)
            .chain(
                self.csws
                    .values()
                    .flat_map(|group| group.values().cloned().map(VerificationRequest::Csw)),
            )
            .collect()
    }

    fn insert_cert(&mut self, request: Arc<CertRequest>) -> RequestId {
        let id = RequestId::Cert(request.cert_hash);
        self.certs.insert(request.cert_hash, request);
        id
    }

    fn insert_csw(&mut self, request: Arc<CswRequest>) -> RequestId {
        let id = RequestId::Csw {
            tx_hash: request.tx_hash,
            position: request.position,
        };
        self.csws
            .entry(request.tx_hash)
            .or_default()
            .insert(request.position, request);
        id
    }

    /// Remove the certificate or transaction with this hash, returning the
    /// identities of the requests removed
    fn remove_parent(&mut self, hash: &Hash256) -> Vec<RequestId> {
        let mut removed = Vec::new();
        if self.certs.remove(hash).is_some() {
            removed.push(RequestId::Cert(*hash));
        }
        if let Some(group) = self.csws.remove(hash) {
            removed.extend(group.into_keys().map(|position| RequestId::Csw {
                tx_hash: *hash,
                position,
            }));
        }
        removed
    }

    fn parents(&self) -> Vec<Hash256> {
        self.certs.keys().chain(self.csws.keys()).copied().collect()
    }

    fn absorb(&mut self, other: RequestSet) {
        self.certs.extend(other.certs);
        for (tx_hash, group) in other.csws {
            self.csws.entry(tx_hash).or_default().extend(group);
        }
    }

    /// Number of certificates plus transactions
    fn parent_count(&self) -> usize {
        self.certs.len() + self.csws.len()
    }
}

#[derive(Debug, Default)]
struct PendingQueue {
    requests: RequestSet,
    /// One entry per single-proof request
    timestamps: BTreeMap<RequestId, Instant>,
}

impl PendingQueue {
    fn check_invariant(&self) {
        debug_assert_eq!(self.timestamps.len(), self.requests.request_count());
    }
}

/// Result of moving the pending queue into the in-flight batch
#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Certificates and transactions purged because a result was already cached
    pub removed: usize,
    /// Requests now in flight
    pub batch: Vec<VerificationRequest>,
}

/// Thread-safe queue of pending and in-flight proof requests
#[derive(Debug, Default)]
pub struct AsyncProofQueue {
    pending: Mutex<PendingQueue>,
    in_flight: Mutex<RequestSet>,
}

impl AsyncProofQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a certificate request; an existing request with the same hash is replaced
    pub fn enqueue_cert(&self, request: CertRequest, now: Instant) {
        let mut pending = self.pending.lock();
        let id = pending.requests.insert_cert(Arc::new(request));
        pending.timestamps.insert(id, now);
        pending.check_invariant();
    }

    /// Queue the CSW requests of one transaction
    pub fn enqueue_csw(&self, requests: Vec<CswRequest>, now: Instant) {
        let mut pending = self.pending.lock();
        for request in requests {
            let id = pending.requests.insert_csw(Arc::new(request));
            pending.timestamps.insert(id, now);
        }
        pending.check_invariant();
    }

    pub fn pending_cert_count(&self) -> usize {
        self.pending.lock().requests.cert_count()
    }

    /// Number of pending transactions with CSW inputs
    pub fn pending_csw_count(&self) -> usize {
        self.pending.lock().requests.csw_tx_count()
    }

    /// Number of pending single-proof requests
    pub fn pending_len(&self) -> usize {
        self.pending.lock().timestamps.len()
    }

    /// Age of the oldest pending request
    pub fn oldest_pending_age(&self, now: Instant) -> Option<Duration> {
        self.pending
            .lock()
            .timestamps
            .values()
            .min()
            .map(|oldest| now.saturating_duration_since(*oldest))
    }

    /// Purge pending entries whose parent hash satisfies `is_resolved`, then move
    /// the rest into the in-flight batch.
    pub fn drain_into_in_flight(&self, is_resolved: impl Fn(&Hash256) -> bool) -> DrainOutcome {
        let mut pending = self.pending.lock();

        let mut removed = 0;
        for parent in pending.requests.parents() {
            if is_resolved(&parent) {
                for id in pending.requests.remove_parent(&parent) {
                    pending.timestamps.remove(&id);
                }
                removed += 1;
            }
        }
        pending.check_invariant();

        let moved = std::mem::take(&mut pending.requests);
        pending.timestamps.clear();

        let batch = moved.requests();
        self.in_flight.lock().absorb(moved);
        DrainOutcome { removed, batch }
    }

    /// Take everything still in flight for dispatch
    pub fn take_in_flight(&self) -> RequestSet {
        std::mem::take(&mut *self.in_flight.lock())
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().request_count()
    }

    /// Drop every in-flight entry; returns the number of certificates and transactions dropped
    pub fn discard_all_in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        let count = in_flight.parent_count();
        *in_flight = RequestSet::default();
        count
    }

    /// Drop the in-flight certificate or transaction with this hash
    pub fn discard_in_flight(&self, hash: &Hash256) -> bool {
        !self.in_flight.lock().remove_parent(hash).is_empty()
    }

    /// Empty both containers
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        pending.requests = RequestSet::default();
        pending.timestamps.clear();
        *self.in_flight.lock() = RequestSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CertProofInput, CswProofInput};
    use crate::types::{Certificate, FieldElement, ScProof, Transaction, VerificationKey};

    fn cert_request(tag: u8) -> CertRequest {
        let certificate = Arc::new(Certificate {
            sc_id: Hash256::digest(b"sc"),
            epoch_number: 0,
            quality: u64::from(tag),
            backward_transfers: vec![],
            forward_transfer_sc_fee: 0,
            mainchain_bwt_request_sc_fee: 0,
            custom_fields: vec![],
            proof: ScProof::default(),
        });
        CertRequest {
            cert_hash: certificate.hash(),
            input: CertProofInput {
                sc_id: certificate.sc_id,
                constant: None,
                epoch_number: 0,
                quality: u64::from(tag),
                backward_transfers: vec![],
                custom_fields: vec![],
                start_cum_comm_tree_root: FieldElement::default(),
                end_cum_comm_tree_root: FieldElement::default(),
                mainchain_bwt_request_sc_fee: 0,
                forward_transfer_sc_fee: 0,
                proof: ScProof::default(),
                verification_key: VerificationKey::default(),
            },
            certificate,
            origin: None,
        }
    }

    fn csw_requests(tag: u8, count: u32) -> Vec<CswRequest> {
        let transaction = Arc::new(Transaction {
            version: -5,
            csw_inputs: vec![],
            payload: vec![tag],
        });
        (0..count)
            .map(|position| CswRequest {
                tx_hash: transaction.hash(),
                position,
                input: CswProofInput {
                    sc_id: Hash256::digest(b"sc"),
                    constant: None,
                    amount: u64::from(position),
                    nullifier: FieldElement::default(),
                    pub_key_hash: [0u8; 20],
                    cert_data_hash: None,
                    ceasing_cum_sc_tx_comm_tree: FieldElement::default(),
                    proof: ScProof::default(),
                    verification_key: VerificationKey::default(),
                },
                transaction: Arc::clone(&transaction),
                origin: None,
            })
            .collect()
    }

    #[test]
    fn test_enqueue_counts() {
        let queue = AsyncProofQueue::new();
        let now = Instant::now();
        queue.enqueue_cert(cert_request(1), now);
        queue.enqueue_cert(cert_request(2), now);
        queue.enqueue_csw(csw_requests(1, 3), now);

        assert_eq!(queue.pending_cert_count(), 2);
        assert_eq!(queue.pending_csw_count(), 1);
        assert_eq!(queue.pending_len(), 5);
    }

    #[test]
    fn test_reenqueue_is_idempotent() {
        let queue = AsyncProofQueue::new();
        let now = Instant::now();
        queue.enqueue_cert(cert_request(1), now);
        queue.enqueue_cert(cert_request(1), now);
        queue.enqueue_csw(csw_requests(1, 2), now);
        queue.enqueue_csw(csw_requests(1, 2), now);

        assert_eq!(queue.pending_cert_count(), 1);
        assert_eq!(queue.pending_csw_count(), 1);
        assert_eq!(queue.pending_len(), 3);
    }

    #[test]
    fn test_oldest_pending_age() {
        let queue = AsyncProofQueue::new();
        let start = Instant::now();
        assert_eq!(queue.oldest_pending_age(start), None);

        queue.enqueue_cert(cert_request(1), start);
        queue.enqueue_cert(cert_request(2), start + Duration::from_millis(50));
        let age = queue
            .oldest_pending_age(start + Duration::from_millis(80))
            .unwrap();
        assert_eq!(age, Duration::from_millis(80));
    }

    #[test]
    fn test_drain_moves_everything() {
        let queue = AsyncProofQueue::new();
        let now = Instant::now();
        queue.enqueue_cert(cert_request(1), now);
        queue.enqueue_csw(csw_requests(1, 2), now);

        let outcome = queue.drain_into_in_flight(|_| false);
        assert_eq!(outcome.removed, 0);
        assert_eq!(outcome.batch.len(), 3);
        assert_eq!(queue.pending_len(), 0);
        assert_eq!(queue.pending_cert_count(), 0);
        assert_eq!(queue.in_flight_len(), 3);

        // Producers keep enqueueing while a batch is in flight
        queue.enqueue_cert(cert_request(2), now);
        assert_eq!(queue.pending_cert_count(), 1);
        assert_eq!(queue.in_flight_len(), 3);

        let taken = queue.take_in_flight();
        assert_eq!(taken.request_count(), 3);
        assert_eq!(queue.in_flight_len(), 0);
    }

    #[test]
    fn test_drain_purges_resolved() {
        let queue = AsyncProofQueue::new();
        let now = Instant::now();
        let cached = cert_request(1);
        let cached_hash = cached.cert_hash;
        queue.enqueue_cert(cached, now);
        queue.enqueue_cert(cert_request(2), now);

        let outcome = queue.drain_into_in_flight(|hash| *hash == cached_hash);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.batch.len(), 1);
        assert_ne!(outcome.batch[0].id(), RequestId::Cert(cached_hash));
    }

    #[test]
    fn test_discard_in_flight() {
        let queue = AsyncProofQueue::new();
        let now = Instant::now();
        let csw = csw_requests(7, 2);
        let tx_hash = csw[0].tx_hash;
        queue.enqueue_csw(csw, now);
        queue.enqueue_cert(cert_request(1), now);

        // Discard never touches the pending queue
        assert!(!queue.discard_in_flight(&tx_hash));
        assert_eq!(queue.pending_csw_count(), 1);

        queue.drain_into_in_flight(|_| false);
        assert!(queue.discard_in_flight(&tx_hash));
        assert!(!queue.discard_in_flight(&tx_hash));
        assert_eq!(queue.in_flight_len(), 1);

        assert_eq!(queue.discard_all_in_flight(), 1);
        assert_eq!(queue.in_flight_len(), 0);
    }
}
