//! Batch verification with retry and one-by-one fallback
//!
//! A batch attempt sends certificates and CSW inputs to the proving backend
//! as two independent calls, run in parallel. Proofs the backend names as
//! failing become `Failed`; a fully valid family becomes `Passed`; anything
//! else stays `Unknown`. Unknown requests get exactly one more batch attempt,
//! then each remaining proof is checked on its own, which always yields
//! `Passed` or `Failed`.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use sc_proof_verifier::{BatchVerifier, SchnorrProvingSystem, VerificationMode};
//!
//! let verifier = BatchVerifier::new(Arc::new(SchnorrProvingSystem::new()), VerificationMode::Strict);
//! let results = verifier.verify(&[]);
//! assert!(results.is_empty());
//! ```

use crate::error::ProvingError;
use crate::input::{CertRequest, CswRequest, RequestId, VerificationRequest};
use crate::proving::{BatchVerdict, ProvingSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Verdict on a single proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VerificationResult {
    Unknown,
    Passed,
    Failed,
}

impl VerificationResult {
    pub fn is_resolved(self) -> bool {
        self != Self::Unknown
    }

    /// Combine the verdicts of the CSW inputs of one transaction
    pub fn combine(results: impl IntoIterator<Item = Self>) -> Self {
        let mut combined = Self::Passed;
        for result in results {
            match result {
                Self::Failed => return Self::Failed,
                Self::Unknown => combined = Self::Unknown,
                Self::Passed => {}
            }
        }
        combined
    }
}

/// How much cryptographic work to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMode {
    /// Verify every proof
    Strict,
    /// Trust every proof without checking it.
    ///
    /// Only for proofs already validated, e.g. while re-indexing. Never use
    /// for anything received from the network.
    Loose,
}

/// Number of batch attempts before falling back to one-by-one verification
const BATCH_ATTEMPTS: usize = 2;

/// Verifies sets of proof requests through a [`ProvingSystem`]
pub struct BatchVerifier {
    proving: Arc<dyn ProvingSystem>,
    mode: VerificationMode,
}

impl BatchVerifier {
    pub fn new(proving: Arc<dyn ProvingSystem>, mode: VerificationMode) -> Self {
        Self { proving, mode }
    }

    pub fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// Resolve every request to `Passed` or `Failed`
    pub fn verify(&self, requests: &[VerificationRequest]) -> BTreeMap<RequestId, VerificationResult> {
        let mut results: BTreeMap<RequestId, VerificationResult> = requests
            .iter()
            .map(|r| (r.id(), VerificationResult::Unknown))
            .collect();

        if self.mode == VerificationMode::Loose {
            results.values_mut().for_each(|r| *r = VerificationResult::Passed);
            return results;
        }

        let start = Instant::now();
        for attempt in 1..=BATCH_ATTEMPTS {
            let pending = unresolved(requests, &results);
            if pending.is_empty() {
                break;
            }
            if attempt > 1 {
                tracing::debug!(attempt, remaining = pending.len(), "Retrying batch verification");
            }
            self.batch_attempt(&pending, &mut results);
        }

        let remaining = unresolved(requests, &results);
        if !remaining.is_empty() {
            tracing::warn!(
                remaining = remaining.len(),
                "Batch verification inconclusive, verifying one by one"
            );
            for request in remaining {
                results.insert(request.id(), self.normal_verify(request));
            }
        }

        tracing::debug!(
            requests = requests.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch verified"
        );
        debug_assert!(results.values().all(|r| r.is_resolved()));
        results
    }

    /// Verify one proof on its own; never `Unknown`
    pub fn normal_verify(&self, request: &VerificationRequest) -> VerificationResult {
        if self.mode == VerificationMode::Loose {
            return VerificationResult::Passed;
        }

        let outcome = match request {
            VerificationRequest::Cert(req) => self.proving.verify_certificate(&req.input),
            VerificationRequest::Csw(req) => self.proving.verify_csw(&req.input),
        };
        match outcome {
            Ok(true) => VerificationResult::Passed,
            Ok(false) => {
                tracing::debug!(request = %request.id(), "Proof did not verify");
                VerificationResult::Failed
            }
            Err(e) => {
                tracing::debug!(request = %request.id(), error = %e, "Proof could not be checked");
                VerificationResult::Failed
            }
        }
    }

    fn batch_attempt(
        &self,
        requests: &[&VerificationRequest],
        results: &mut BTreeMap<RequestId, VerificationResult>,
    ) {
        let mut certs: Vec<&CertRequest> = Vec::new();
        let mut csws: Vec<&CswRequest> = Vec::new();
        for request in requests {
            match request {
                VerificationRequest::Cert(req) => certs.push(req),
                VerificationRequest::Csw(req) => csws.push(req),
            }
        }

        let (cert_verdict, csw_verdict) = rayon::join(
            || {
                let inputs: Vec<_> = certs.iter().map(|r| &r.input).collect();
                (!inputs.is_empty()).then(|| self.proving.batch_verify_certificates(&inputs))
            },
            || {
                let inputs: Vec<_> = csws.iter().map(|r| &r.input).collect();
                (!inputs.is_empty()).then(|| self.proving.batch_verify_csw(&inputs))
            },
        );

        let cert_ids: Vec<_> = certs.iter().map(|r| RequestId::Cert(r.cert_hash)).collect();
        let csw_ids: Vec<_> = csws
            .iter()
            .map(|r| RequestId::Csw {
                tx_hash: r.tx_hash,
                position: r.position,
            })
            .collect();

        if let Some(verdict) = cert_verdict {
            apply_verdict("certificate", &cert_ids, verdict, results);
        }
        if let Some(verdict) = csw_verdict {
            apply_verdict("csw", &csw_ids, verdict, results);
        }
    }
}

fn unresolved<'a>(
    requests: &'a [VerificationRequest],
    results: &BTreeMap<RequestId, VerificationResult>,
) -> Vec<&'a VerificationRequest> {
    requests
        .iter()
        .filter(|r| results.get(&r.id()) == Some(&VerificationResult::Unknown))
        .collect()
}

fn apply_verdict(
    family: &str,
    ids: &[RequestId],
    verdict: Result<BatchVerdict, ProvingError>,
    results: &mut BTreeMap<RequestId, VerificationResult>,
) {
    match verdict {
        Ok(verdict) if verdict.all_valid => {
            for id in ids {
                results.insert(*id, VerificationResult::Passed);
            }
        }
        Ok(verdict) => {
            for index in verdict.failed {
                match ids.get(index) {
                    Some(id) => {
                        results.insert(*id, VerificationResult::Failed);
                    }
                    None => tracing::warn!(family, index, "Backend reported unknown proof index"),
                }
            }
        }
        Err(e) => {
            tracing::warn!(family, proofs = ids.len(), error = %e, "Batch verification inconclusive");
        }
    }
}
