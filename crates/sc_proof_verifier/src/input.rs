//! Verification input extraction
//!
//! Turns an incoming certificate or CSW-bearing transaction plus a read-only
//! [`SidechainView`] into the concrete public inputs the proving backend checks.
//! Extraction never judges a proof; it only fails when the view lacks state the
//! caller should already have checked (unknown sidechain, missing epoch
//! boundary, missing CSW key).

use crate::error::{Result, VerifierError};
use crate::types::{
    BackwardTransfer, Certificate, FieldElement, Hash256, NodeId, ScId, ScProof, Transaction,
    VerificationKey,
};
use crate::view::SidechainView;
use std::fmt;
use std::sync::Arc;

/// Public inputs of a certificate proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertProofInput {
    pub sc_id: ScId,
    pub constant: Option<FieldElement>,
    pub epoch_number: u32,
    pub quality: u64,
    pub backward_transfers: Vec<BackwardTransfer>,
    pub custom_fields: Vec<FieldElement>,
    /// Cumulative commitment tree root at the last block of the previous epoch
    pub start_cum_comm_tree_root: FieldElement,
    /// Cumulative commitment tree root at the last block of this epoch
    pub end_cum_comm_tree_root: FieldElement,
    pub mainchain_bwt_request_sc_fee: u64,
    pub forward_transfer_sc_fee: u64,
    pub proof: ScProof,
    pub verification_key: VerificationKey,
}

/// Public inputs of a ceased sidechain withdrawal proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CswProofInput {
    pub sc_id: ScId,
    pub constant: Option<FieldElement>,
    pub amount: u64,
    pub nullifier: FieldElement,
    pub pub_key_hash: [u8; 20],
    pub cert_data_hash: Option<FieldElement>,
    pub ceasing_cum_sc_tx_comm_tree: FieldElement,
    pub proof: ScProof,
    pub verification_key: VerificationKey,
}

/// Identity of a single proof verification request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequestId {
    Cert(Hash256),
    Csw { tx_hash: Hash256, position: u32 },
}

impl RequestId {
    /// Hash of the certificate or transaction the request belongs to
    pub fn parent(&self) -> Hash256 {
        match self {
            Self::Cert(hash) => *hash,
            Self::Csw { tx_hash, .. } => *tx_hash,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cert(hash) => write!(f, "cert:{}", hash),
            Self::Csw { tx_hash, position } => write!(f, "csw:{}:{}", tx_hash, position),
        }
    }
}

/// Pending certificate proof check
#[derive(Debug, Clone)]
pub struct CertRequest {
    pub cert_hash: Hash256,
    pub input: CertProofInput,
    /// Kept alive until the request resolves
    pub certificate: Arc<Certificate>,
    pub origin: Option<NodeId>,
}

/// Pending check of one CSW input of a transaction
#[derive(Debug, Clone)]
pub struct CswRequest {
    pub tx_hash: Hash256,
    pub position: u32,
    pub input: CswProofInput,
    pub transaction: Arc<Transaction>,
    pub origin: Option<NodeId>,
}

/// A certificate or CSW verification request
#[derive(Debug, Clone)]
pub enum VerificationRequest {
    Cert(Arc<CertRequest>),
    Csw(Arc<CswRequest>),
}

impl VerificationRequest {
    pub fn id(&self) -> RequestId {
        match self {
            Self::Cert(req) => RequestId::Cert(req.cert_hash),
            Self::Csw(req) => RequestId::Csw {
                tx_hash: req.tx_hash,
                position: req.position,
            },
        }
    }
}

/// Build the certificate request, resolving epoch boundaries through `view`.
///
/// For epoch `e` of a sidechain created at height `h` with epoch length `L`,
/// the boundary blocks are `h + e*L - 1` and `h + (e+1)*L - 1`.
pub fn extract_cert_inputs(
    view: &dyn SidechainView,
    certificate: &Arc<Certificate>,
    origin: Option<NodeId>,
) -> Result<CertRequest> {
    let sc_id = certificate.sc_id;
    let epoch = certificate.epoch_number;
    let sidechain = view
        .sidechain(&sc_id)
        .ok_or(VerifierError::UnknownSidechain(sc_id))?;

    let (start_height, end_height) = epoch_boundaries(
        sidechain.creation_block_height,
        sidechain.withdrawal_epoch_length,
        epoch,
    )
    .ok_or(VerifierError::EpochOutOfRange { sc_id, epoch })?;

    let boundary_root = |height: u64| {
        view.cum_commitment_tree_root(height)
            .ok_or(VerifierError::MissingEpochBoundary {
                sc_id,
                epoch,
                height,
            })
    };
    let start_cum_comm_tree_root = boundary_root(start_height)?;
    let end_cum_comm_tree_root = boundary_root(end_height)?;

    Ok(CertRequest {
        cert_hash: certificate.hash(),
        input: CertProofInput {
            sc_id,
            constant: sidechain.constant,
            epoch_number: epoch,
            quality: certificate.quality,
            backward_transfers: certificate.backward_transfers.clone(),
            custom_fields: certificate.custom_fields.clone(),
            start_cum_comm_tree_root,
            end_cum_comm_tree_root,
            mainchain_bwt_request_sc_fee: certificate.mainchain_bwt_request_sc_fee,
            forward_transfer_sc_fee: certificate.forward_transfer_sc_fee,
            proof: certificate.proof.clone(),
            verification_key: sidechain.cert_verification_key,
        },
        certificate: Arc::clone(certificate),
        origin,
    })
}

/// Build one request per CSW input of `transaction`, in input order.
pub fn extract_csw_inputs(
    view: &dyn SidechainView,
    transaction: &Arc<Transaction>,
    origin: Option<NodeId>,
) -> Result<Vec<CswRequest>> {
    let tx_hash = transaction.hash();
    if transaction.csw_inputs.is_empty() {
        return Err(VerifierError::NoCswInputs(tx_hash));
    }

    transaction
        .csw_inputs
        .iter()
        .enumerate()
        .map(|(position, csw)| -> Result<CswRequest> {
            let sidechain = view
                .sidechain(&csw.sc_id)
                .ok_or(VerifierError::UnknownSidechain(csw.sc_id))?;
            let verification_key = sidechain
                .csw_verification_key
                .ok_or(VerifierError::MissingCswVerificationKey(csw.sc_id))?;

            Ok(CswRequest {
                tx_hash,
                position: position as u32,
                input: CswProofInput {
                    sc_id: csw.sc_id,
                    constant: sidechain.constant,
                    amount: csw.amount,
                    nullifier: csw.nullifier,
                    pub_key_hash: csw.pub_key_hash,
                    cert_data_hash: view.active_cert_data_hash(&csw.sc_id),
                    ceasing_cum_sc_tx_comm_tree: csw.ceasing_cum_sc_tx_comm_tree,
                    proof: csw.proof.clone(),
                    verification_key,
                },
                transaction: Arc::clone(transaction),
                origin,
            })
        })
        .collect()
}

fn epoch_boundaries(creation_height: u64, epoch_length: u32, epoch: u32) -> Option<(u64, u64)> {
    let length = u64::from(epoch_length);
    let start = creation_height
        .checked_add(u64::from(epoch).checked_mul(length)?)?
        .checked_sub(1)?;
    let end = start.checked_add(length)?;
    Some((start, end))
}
