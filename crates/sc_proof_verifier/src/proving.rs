//! Proving-system boundary
//!
//! [`ProvingSystem`] is the narrow surface the verifier needs from a proving
//! library: batch and single verification per proof family, plus the
//! low-priority thread pause used by [`crate::pause`].
//!
//! [`SchnorrProvingSystem`] is the bundled backend. A proof is a Schnorr proof
//! of knowledge over Ristretto whose Fiat-Shamir challenge binds a SHA-256
//! digest of the request's public inputs, so editing any public input (a fee,
//! an amount, the quality) invalidates the proof.
//!
//! Batch verification uses a random linear combination: instead of checking
//! `s_i*G == R_i + c_i*P_i` for each proof we check
//! `sum(z_i*s_i)*G == sum(z_i*R_i) + sum(z_i*c_i*P_i)` with random `z_i`, one
//! multiscalar multiplication for the whole batch.

use crate::error::ProvingError;
use crate::input::{CertProofInput, CswProofInput};
use crate::types::{FieldElement, ScProof, VerificationKey};

use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT,
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
    traits::MultiscalarMul,
};
use rand::{rngs::OsRng, Rng};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};

/// Length of an encoded proof: commitment, challenge, response
pub const PROOF_LEN: usize = 96;

/// Outcome of one batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchVerdict {
    /// True if every proof in the batch verified
    pub all_valid: bool,
    /// Indices (into the submitted slice) of proofs known to be invalid
    pub failed: Vec<usize>,
}

impl BatchVerdict {
    pub fn valid() -> Self {
        Self {
            all_valid: true,
            failed: Vec::new(),
        }
    }
}

/// Proving library consumed by the verifier.
///
/// Batch calls return `Err` when the library could not reach a verdict; the
/// caller treats the whole family as inconclusive. `Ok` with `all_valid ==
/// false` names the failing proofs it identified, and says nothing about the
/// others.
pub trait ProvingSystem: Send + Sync {
    fn batch_verify_certificates(
        &self,
        inputs: &[&CertProofInput],
    ) -> Result<BatchVerdict, ProvingError>;

    fn batch_verify_csw(&self, inputs: &[&CswProofInput]) -> Result<BatchVerdict, ProvingError>;

    /// `Err` means the proof could not even be checked; callers treat it as invalid
    fn verify_certificate(&self, input: &CertProofInput) -> Result<bool, ProvingError>;

    fn verify_csw(&self, input: &CswProofInput) -> Result<bool, ProvingError>;

    /// Ask the library to yield CPU held by non-critical work
    fn pause_low_priority_threads(&self);

    fn resume_low_priority_threads(&self);

    fn low_priority_paused(&self) -> bool;
}

/// Secret proving key of a sidechain circuit
pub struct ProvingKey {
    secret: Scalar,
    public: RistrettoPoint,
}

impl ProvingKey {
    /// Generate a fresh key pair
    pub fn generate() -> Self {
        let secret = Scalar::random(&mut OsRng);
        Self {
            secret,
            public: RISTRETTO_BASEPOINT_POINT * secret,
        }
    }

    /// Verification key to register at sidechain creation
    pub fn verification_key(&self) -> VerificationKey {
        VerificationKey(self.public.compress().to_bytes().to_vec())
    }

    /// Schnorr proof of knowledge bound to `statement`
    fn prove(&self, statement: &[u8; 32]) -> ScProof {
        let k = Scalar::random(&mut OsRng);
        let r_bytes = (RISTRETTO_BASEPOINT_POINT * k).compress().to_bytes();
        let challenge = challenge_hash(&r_bytes, &self.public, statement);
        let c = Scalar::from_bytes_mod_order(challenge);
        let s = k + c * self.secret;

        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.extend_from_slice(&r_bytes);
        proof.extend_from_slice(&challenge);
        proof.extend_from_slice(&s.to_bytes());
        ScProof(proof)
    }
}

/// Bundled Schnorr-over-Ristretto backend
#[derive(Debug, Default)]
pub struct SchnorrProvingSystem {
    low_priority_paused: AtomicBool,
}

impl SchnorrProvingSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prove a certificate's public inputs. The `proof` field of `input` is ignored.
    pub fn prove_certificate(key: &ProvingKey, input: &CertProofInput) -> ScProof {
        key.prove(&cert_statement(input))
    }

    /// Prove a CSW input's public inputs. The `proof` field of `input` is ignored.
    pub fn prove_csw(key: &ProvingKey, input: &CswProofInput) -> ScProof {
        key.prove(&csw_statement(input))
    }

    fn batch_verify(&self, proofs: Vec<Result<ParsedProof, ProvingError>>) -> BatchVerdict {
        let mut failed = Vec::new();
        let mut parsed = Vec::with_capacity(proofs.len());

        for (index, proof) in proofs.into_iter().enumerate() {
            match proof {
                Ok(p) if p.challenge_matches() => parsed.push((index, p)),
                Ok(_) => failed.push(index),
                Err(e) => {
                    tracing::debug!(index, error = %e, "Unparsable proof in batch");
                    failed.push(index);
                }
            }
        }

        if parsed.len() > 1 && !combined_check(&parsed) {
            // The combination only says that something is wrong; find what
            let check = |(index, p): &(usize, ParsedProof)| (!p.equation_holds()).then_some(*index);
            let invalid: Vec<usize> = if self.low_priority_paused() {
                parsed.iter().filter_map(check).collect()
            } else {
                parsed.par_iter().filter_map(check).collect()
            };
            failed.extend(invalid);
        } else if parsed.len() == 1 && !parsed[0].1.equation_holds() {
            failed.push(parsed[0].0);
        }

        failed.sort_unstable();
        BatchVerdict {
            all_valid: failed.is_empty(),
            failed,
        }
    }
}

impl ProvingSystem for SchnorrProvingSystem {
    fn batch_verify_certificates(
        &self,
        inputs: &[&CertProofInput],
    ) -> Result<BatchVerdict, ProvingError> {
        let proofs = inputs
            .iter()
            .map(|i| ParsedProof::parse(&i.proof, &i.verification_key, cert_statement(i)))
            .collect();
        Ok(self.batch_verify(proofs))
    }

    fn batch_verify_csw(&self, inputs: &[&CswProofInput]) -> Result<BatchVerdict, ProvingError> {
        let proofs = inputs
            .iter()
            .map(|i| ParsedProof::parse(&i.proof, &i.verification_key, csw_statement(i)))
            .collect();
        Ok(self.batch_verify(proofs))
    }

    fn verify_certificate(&self, input: &CertProofInput) -> Result<bool, ProvingError> {
        ParsedProof::parse(&input.proof, &input.verification_key, cert_statement(input))
            .map(|p| p.verify())
    }

    fn verify_csw(&self, input: &CswProofInput) -> Result<bool, ProvingError> {
        ParsedProof::parse(&input.proof, &input.verification_key, csw_statement(input))
            .map(|p| p.verify())
    }

    fn pause_low_priority_threads(&self) {
        self.low_priority_paused.store(true, Ordering::SeqCst);
    }

    fn resume_low_priority_threads(&self) {
        self.low_priority_paused.store(false, Ordering::SeqCst);
    }

    fn low_priority_paused(&self) -> bool {
        self.low_priority_paused.load(Ordering::SeqCst)
    }
}

struct ParsedProof {
    commitment: [u8; 32],
    challenge: [u8; 32],
    r: RistrettoPoint,
    c: Scalar,
    s: Scalar,
    public: RistrettoPoint,
    statement: [u8; 32],
}

impl ParsedProof {
    fn parse(
        proof: &ScProof,
        key: &VerificationKey,
        statement: [u8; 32],
    ) -> Result<Self, ProvingError> {
        let bytes = proof.as_bytes();
        if bytes.len() != PROOF_LEN {
            return Err(ProvingError::MalformedProof(format!(
                "expected {} bytes, got {}",
                PROOF_LEN,
                bytes.len()
            )));
        }

        let public = decompress(key.as_bytes())
            .ok_or_else(|| ProvingError::MalformedKey("not a Ristretto point".into()))?;
        let r = decompress(&bytes[0..32])
            .ok_or_else(|| ProvingError::MalformedProof("invalid commitment".into()))?;

        let mut commitment = [0u8; 32];
        let mut challenge = [0u8; 32];
        let mut response = [0u8; 32];
        commitment.copy_from_slice(&bytes[0..32]);
        challenge.copy_from_slice(&bytes[32..64]);
        response.copy_from_slice(&bytes[64..96]);

        Ok(Self {
            commitment,
            challenge,
            r,
            c: Scalar::from_bytes_mod_order(challenge),
            s: Scalar::from_bytes_mod_order(response),
            public,
            statement,
        })
    }

    /// c == H(R || P || statement)
    fn challenge_matches(&self) -> bool {
        challenge_hash(&self.commitment, &self.public, &self.statement) == self.challenge
    }

    /// s*G == R + c*P
    fn equation_holds(&self) -> bool {
        RISTRETTO_BASEPOINT_POINT * self.s == self.r + self.public * self.c
    }

    fn verify(&self) -> bool {
        self.challenge_matches() && self.equation_holds()
    }
}

fn combined_check(parsed: &[(usize, ParsedProof)]) -> bool {
    let mut rng = OsRng;
    let coefficients: Vec<Scalar> = (0..parsed.len())
        .map(|_| {
            let mut bytes = [0u8; 64];
            rng.fill(&mut bytes);
            Scalar::from_bytes_mod_order_wide(&bytes)
        })
        .collect();

    let mut sum_zs = Scalar::ZERO;
    let mut scalars = Vec::with_capacity(parsed.len() * 2);
    let mut points = Vec::with_capacity(parsed.len() * 2);
    for ((_, p), z) in parsed.iter().zip(&coefficients) {
        sum_zs += z * p.s;
        scalars.push(*z);
        points.push(p.r);
        scalars.push(z * p.c);
        points.push(p.public);
    }

    RISTRETTO_BASEPOINT_POINT * sum_zs == RistrettoPoint::multiscalar_mul(scalars, points)
}

fn decompress(bytes: &[u8]) -> Option<RistrettoPoint> {
    CompressedRistretto::from_slice(bytes).ok()?.decompress()
}

fn challenge_hash(commitment: &[u8; 32], public: &RistrettoPoint, statement: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(commitment);
    hasher.update(public.compress().as_bytes());
    hasher.update(statement);
    hasher.finalize().into()
}

fn update_optional(hasher: &mut Sha256, fe: &Option<FieldElement>) {
    match fe {
        Some(fe) => {
            hasher.update([1u8]);
            hasher.update(fe.as_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Digest of a certificate's public inputs
pub fn cert_statement(input: &CertProofInput) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"sc_proof_verifier/cert");
    hasher.update(input.sc_id.as_bytes());
    update_optional(&mut hasher, &input.constant);
    hasher.update(input.epoch_number.to_le_bytes());
    hasher.update(input.quality.to_le_bytes());
    hasher.update((input.backward_transfers.len() as u64).to_le_bytes());
    for bt in &input.backward_transfers {
        hasher.update(bt.pub_key_hash);
        hasher.update(bt.amount.to_le_bytes());
    }
    hasher.update((input.custom_fields.len() as u64).to_le_bytes());
    for fe in &input.custom_fields {
        hasher.update(fe.as_bytes());
    }
    hasher.update(input.start_cum_comm_tree_root.as_bytes());
    hasher.update(input.end_cum_comm_tree_root.as_bytes());
    hasher.update(input.mainchain_bwt_request_sc_fee.to_le_bytes());
    hasher.update(input.forward_transfer_sc_fee.to_le_bytes());
    hasher.finalize().into()
}

/// Digest of a CSW input's public inputs
pub fn csw_statement(input: &CswProofInput) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"sc_proof_verifier/csw");
    hasher.update(input.sc_id.as_bytes());
    update_optional(&mut hasher, &input.constant);
    hasher.update(input.amount.to_le_bytes());
    hasher.update(input.nullifier.as_bytes());
    hasher.update(input.pub_key_hash);
    update_optional(&mut hasher, &input.cert_data_hash);
    hasher.update(input.ceasing_cum_sc_tx_comm_tree.as_bytes());
    hasher.finalize().into()
}
