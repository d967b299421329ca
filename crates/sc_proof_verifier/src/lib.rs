//! # Sidechain Proof Verifier
//!
//! Asynchronous, batched verification of sidechain certificate proofs and
//! ceased sidechain withdrawal (CSW) proofs for AIngle nodes.
//!
//! ## Features
//!
//! - **Off the hot path**: message handlers enqueue, a background driver verifies
//! - **Batch Verification**: one multiscalar check per proof family, with a
//!   retry and a one-by-one fallback when the batch is inconclusive
//! - **Result Cache**: duplicates of recently judged proofs are never re-verified
//! - **Pause Gate**: latency-sensitive work can hold off new batches
//! - **Cancellation**: in-flight requests can be discarded without a verdict
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     AsyncProofVerifier                        │
//! ├───────────────────────────────────────────────────────────────┤
//! │  Extractor  │  Queue  │  Batch  │  Pause  │  Dispatcher/Cache │
//! └───────────────────────────────────────────────────────────────┘
//!        │           │         │         │              │
//!        ├─ Cert     ├─ Pending├─ Batch  ├─ Guard       ├─ Listener
//!        └─ CSW      └─ In     ├─ Retry  └─ Batch slot  ├─ Cache
//!                       flight └─ Single                └─ Stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use sc_proof_verifier::*;
//! use std::sync::Arc;
//!
//! struct Mempool;
//!
//! impl VerificationListener for Mempool {
//!     fn on_proof_verified(
//!         &self,
//!         subject: VerifiedSubject,
//!         _origin: Option<NodeId>,
//!         outcome: VerificationOutcome,
//!         _state: ValidationState,
//!     ) {
//!         assert!(matches!(subject, VerifiedSubject::Certificate(_)));
//!         assert_eq!(outcome, VerificationOutcome::Verified);
//!     }
//! }
//!
//! // Sidechain created at height 100 with 10-block epochs
//! let key = ProvingKey::generate();
//! let sc_id = Hash256::digest(b"sidechain");
//! let mut view = MemorySidechainView::new();
//! view.insert_sidechain(
//!     sc_id,
//!     SidechainRecord {
//!         creation_block_height: 100,
//!         withdrawal_epoch_length: 10,
//!         constant: None,
//!         cert_verification_key: key.verification_key(),
//!         csw_verification_key: None,
//!         current_epoch: None,
//!         current_quality: None,
//!         current_cert_hash: None,
//!     },
//! );
//! view.set_cum_commitment_tree_root(99, FieldElement::new([1; 32]));
//! view.set_cum_commitment_tree_root(109, FieldElement::new([2; 32]));
//!
//! // The sidechain proves the certificate's public inputs
//! let mut certificate = Certificate {
//!     sc_id,
//!     epoch_number: 0,
//!     quality: 1,
//!     backward_transfers: vec![],
//!     forward_transfer_sc_fee: 0,
//!     mainchain_bwt_request_sc_fee: 0,
//!     custom_fields: vec![],
//!     proof: ScProof::default(),
//! };
//! let unproven = extract_cert_inputs(&view, &Arc::new(certificate.clone()), None).unwrap();
//! certificate.proof = SchnorrProvingSystem::prove_certificate(&key, &unproven.input);
//!
//! let verifier = AsyncProofVerifier::new(
//!     VerifierConfig::default(),
//!     Arc::new(SchnorrProvingSystem::new()),
//!     Arc::new(Mempool),
//! )
//! .unwrap();
//! verifier
//!     .enqueue_cert_verification(&view, Arc::new(certificate), Some(NodeId(7)))
//!     .unwrap();
//! assert_eq!(verifier.pending_cert_count(), 1);
//!
//! verifier.process_pending(true);
//! assert_eq!(verifier.pending_cert_count(), 0);
//! assert_eq!(verifier.stats().ok_cert_count, 1);
//! ```
//!
//! In a node the cycle runs on a background thread instead:
//! `Arc::new(verifier).spawn_driver()` returns a [`DriverHandle`] that stops
//! the thread when shut down or dropped.
//!
//! ## Security Considerations
//!
//! - [`VerificationMode::Loose`] skips all cryptographic work. Only use it
//!   for proofs that were already validated, never for network input.
//! - An invalid proof is a normal [`VerificationResult::Failed`] outcome,
//!   reported with a DoS score so the peer can be penalized.

pub mod batch;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod input;
pub mod pause;
pub mod proving;
pub mod queue;
pub mod types;
pub mod verifier;
pub mod view;

mod stats;

// Re-export main types
pub use batch::{BatchVerifier, VerificationMode, VerificationResult};
pub use cache::BoundedCache;
pub use config::{BatchLimits, VerifierConfig};
pub use dispatch::{CachedVerdict, ValidationState, VerificationListener, VerificationOutcome};
pub use driver::{CancellationToken, DriverHandle, DriverState};
pub use error::{ProvingError, Result, VerifierError};
pub use input::{
    extract_cert_inputs, extract_csw_inputs, CertProofInput, CertRequest, CswProofInput,
    CswRequest, RequestId, VerificationRequest,
};
pub use pause::{BatchCoordinator, BatchSlot, PauseGuard};
pub use proving::{BatchVerdict, ProvingKey, ProvingSystem, SchnorrProvingSystem};
pub use queue::{AsyncProofQueue, DrainOutcome, RequestSet};
pub use stats::VerifierStats;
pub use types::{
    BackwardTransfer, Certificate, CswInput, FieldElement, Hash256, NodeId, ScId, ScProof,
    SidechainRecord, Transaction, VerificationKey, VerifiedSubject,
};
pub use verifier::{AsyncProofVerifier, CycleOutcome};
pub use view::{MemorySidechainView, SidechainView};
