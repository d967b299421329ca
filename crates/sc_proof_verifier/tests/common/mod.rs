//! Shared fixtures for integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use sc_proof_verifier::*;
use std::result::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const CREATION_HEIGHT: u64 = 100;
pub const EPOCH_LENGTH: u32 = 10;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One sidechain with certificate and CSW keys, and commitment roots for its
/// first few epochs
pub struct Fixture {
    pub view: MemorySidechainView,
    pub sc_id: ScId,
    pub cert_key: ProvingKey,
    pub csw_key: ProvingKey,
}

impl Fixture {
    pub fn new() -> Self {
        let sc_id = Hash256::digest(b"test sidechain");
        let cert_key = ProvingKey::generate();
        let csw_key = ProvingKey::generate();

        let mut view = MemorySidechainView::new();
        view.insert_sidechain(
            sc_id,
            SidechainRecord {
                creation_block_height: CREATION_HEIGHT,
                withdrawal_epoch_length: EPOCH_LENGTH,
                constant: Some(FieldElement::new([9u8; 32])),
                cert_verification_key: cert_key.verification_key(),
                csw_verification_key: Some(csw_key.verification_key()),
                current_epoch: None,
                current_quality: None,
                current_cert_hash: None,
            },
        );
        view.set_active_cert_data_hash(sc_id, FieldElement::new([4u8; 32]));
        for epoch in 0..=4u64 {
            let height = CREATION_HEIGHT + epoch * u64::from(EPOCH_LENGTH) - 1;
            view.set_cum_commitment_tree_root(height, FieldElement::new([epoch as u8 + 1; 32]));
        }

        Self {
            view,
            sc_id,
            cert_key,
            csw_key,
        }
    }

    /// Certificate for `epoch` carrying a valid proof
    pub fn certificate(&self, epoch: u32, quality: u64) -> Certificate {
        let mut certificate = Certificate {
            sc_id: self.sc_id,
            epoch_number: epoch,
            quality,
            backward_transfers: vec![BackwardTransfer {
                pub_key_hash: [quality as u8; 20],
                amount: 1_000 + quality,
            }],
            forward_transfer_sc_fee: 5,
            mainchain_bwt_request_sc_fee: 2,
            custom_fields: vec![FieldElement::new([quality as u8; 32])],
            proof: ScProof::default(),
        };
        let request = extract_cert_inputs(&self.view, &Arc::new(certificate.clone()), None)
            .expect("fixture certificate resolves");
        certificate.proof = SchnorrProvingSystem::prove_certificate(&self.cert_key, &request.input);
        certificate
    }

    /// Certificate whose forward transfer fee was changed after proving
    pub fn tampered_certificate(&self, epoch: u32, quality: u64) -> Certificate {
        let mut certificate = self.certificate(epoch, quality);
        certificate.forward_transfer_sc_fee += 1;
        certificate
    }

    /// Transaction with one validly proven CSW input per amount
    pub fn csw_transaction(&self, tag: u8, amounts: &[u64]) -> Transaction {
        let mut transaction = Transaction {
            version: -5,
            csw_inputs: amounts
                .iter()
                .enumerate()
                .map(|(i, amount)| CswInput {
                    sc_id: self.sc_id,
                    amount: *amount,
                    nullifier: FieldElement::new([tag.wrapping_add(i as u8); 32]),
                    pub_key_hash: [tag; 20],
                    ceasing_cum_sc_tx_comm_tree: FieldElement::new([7u8; 32]),
                    proof: ScProof::default(),
                })
                .collect(),
            payload: vec![tag],
        };
        let requests = extract_csw_inputs(&self.view, &Arc::new(transaction.clone()), None)
            .expect("fixture transaction resolves");
        for (csw, request) in transaction.csw_inputs.iter_mut().zip(&requests) {
            csw.proof = SchnorrProvingSystem::prove_csw(&self.csw_key, &request.input);
        }
        transaction
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub hash: Hash256,
    pub is_certificate: bool,
    pub origin: Option<NodeId>,
    pub outcome: VerificationOutcome,
    pub state: ValidationState,
}

/// Listener that records every notification
#[derive(Default)]
pub struct RecordingListener {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn count_outcome(&self, outcome: VerificationOutcome) -> usize {
        self.notifications
            .lock()
            .iter()
            .filter(|n| n.outcome == outcome)
            .count()
    }

    pub fn find(&self, hash: &Hash256) -> Option<Notification> {
        self.notifications
            .lock()
            .iter()
            .find(|n| n.hash == *hash)
            .cloned()
    }

    /// Poll until at least `count` notifications arrived
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.count() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.count() >= count
    }
}

impl VerificationListener for RecordingListener {
    fn on_proof_verified(
        &self,
        subject: VerifiedSubject,
        origin: Option<NodeId>,
        outcome: VerificationOutcome,
        state: ValidationState,
    ) {
        self.notifications.lock().push(Notification {
            hash: subject.hash(),
            is_certificate: matches!(subject, VerifiedSubject::Certificate(_)),
            origin,
            outcome,
            state,
        });
    }
}

/// Backend whose first `failing_batches` batch calls are inconclusive
#[derive(Default)]
pub struct FlakyProvingSystem {
    inner: SchnorrProvingSystem,
    failures_left: AtomicUsize,
    batch_calls: AtomicUsize,
    single_calls: AtomicUsize,
}

impl FlakyProvingSystem {
    pub fn new(failing_batches: usize) -> Arc<Self> {
        Arc::new(Self {
            failures_left: AtomicUsize::new(failing_batches),
            ..Self::default()
        })
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst)
    }

    fn batch_call(&self) -> Result<(), ProvingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            Err(ProvingError::Backend("simulated batch failure".into()))
        } else {
            Ok(())
        }
    }
}

impl ProvingSystem for FlakyProvingSystem {
    fn batch_verify_certificates(
        &self,
        inputs: &[&CertProofInput],
    ) -> Result<BatchVerdict, ProvingError> {
        self.batch_call()?;
        self.inner.batch_verify_certificates(inputs)
    }

    fn batch_verify_csw(&self, inputs: &[&CswProofInput]) -> Result<BatchVerdict, ProvingError> {
        self.batch_call()?;
        self.inner.batch_verify_csw(inputs)
    }

    fn verify_certificate(&self, input: &CertProofInput) -> Result<bool, ProvingError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_certificate(input)
    }

    fn verify_csw(&self, input: &CswProofInput) -> Result<bool, ProvingError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_csw(input)
    }

    fn pause_low_priority_threads(&self) {
        self.inner.pause_low_priority_threads();
    }

    fn resume_low_priority_threads(&self) {
        self.inner.resume_low_priority_threads();
    }

    fn low_priority_paused(&self) -> bool {
        self.inner.low_priority_paused()
    }
}

/// Backend whose certificate batch calls block until released, to observe a
/// batch while it is being verified
pub struct GatedProvingSystem {
    inner: SchnorrProvingSystem,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

/// Test side of a [`GatedProvingSystem`]
pub struct Gate {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

impl GatedProvingSystem {
    pub fn new() -> (Arc<Self>, Gate) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let backend = Arc::new(Self {
            inner: SchnorrProvingSystem::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        (
            backend,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl ProvingSystem for GatedProvingSystem {
    fn batch_verify_certificates(
        &self,
        inputs: &[&CertProofInput],
    ) -> Result<BatchVerdict, ProvingError> {
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv_timeout(Duration::from_secs(10));
        self.inner.batch_verify_certificates(inputs)
    }

    fn batch_verify_csw(&self, inputs: &[&CswProofInput]) -> Result<BatchVerdict, ProvingError> {
        self.inner.batch_verify_csw(inputs)
    }

    fn verify_certificate(&self, input: &CertProofInput) -> Result<bool, ProvingError> {
        self.inner.verify_certificate(input)
    }

    fn verify_csw(&self, input: &CswProofInput) -> Result<bool, ProvingError> {
        self.inner.verify_csw(input)
    }

    fn pause_low_priority_threads(&self) {
        self.inner.pause_low_priority_threads();
    }

    fn resume_low_priority_threads(&self) {
        self.inner.resume_low_priority_threads();
    }

    fn low_priority_paused(&self) -> bool {
        self.inner.low_priority_paused()
    }
}

pub fn verifier_with(
    config: VerifierConfig,
    proving: Arc<dyn ProvingSystem>,
) -> (Arc<AsyncProofVerifier>, Arc<RecordingListener>) {
    let listener = RecordingListener::new();
    let verifier = AsyncProofVerifier::new(config, proving, listener.clone())
        .expect("valid test configuration");
    (Arc::new(verifier), listener)
}

pub fn verifier() -> (Arc<AsyncProofVerifier>, Arc<RecordingListener>) {
    verifier_with(VerifierConfig::test_mode(), Arc::new(SchnorrProvingSystem::new()))
}
