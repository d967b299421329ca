//! Domain types: hashes, certificates, transactions and sidechain records

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte identifier (certificate hash, transaction hash, sidechain id)
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// Create a hash from raw bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// BLAKE3 digest of arbitrary data
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", &self.to_hex()[..16])
    }
}

/// Sidechain identifier
pub type ScId = Hash256;

/// An element of the proving system's field, carried as its canonical encoding
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldElement(pub [u8; 32]);

impl FieldElement {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for FieldElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldElement({})", hex::encode(&self.0[..8]))
    }
}

/// Opaque SNARK proof bytes
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScProof(pub Vec<u8>);

impl ScProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ScProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScProof({} bytes)", self.0.len())
    }
}

/// Opaque verification key bytes
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationKey(pub Vec<u8>);

impl VerificationKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({} bytes)", self.0.len())
    }
}

/// Handle of the peer a certificate or transaction was received from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer={}", self.0)
    }
}

/// A backward transfer paid out on the mainchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardTransfer {
    /// Destination public key hash
    pub pub_key_hash: [u8; 20],
    /// Amount in the smallest unit
    pub amount: u64,
}

/// Withdrawal certificate issued by a sidechain for one epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub sc_id: ScId,
    pub epoch_number: u32,
    pub quality: u64,
    pub backward_transfers: Vec<BackwardTransfer>,
    /// Minimum amount of a forward transfer accepted by the sidechain
    pub forward_transfer_sc_fee: u64,
    /// Fee for a mainchain backward transfer request
    pub mainchain_bwt_request_sc_fee: u64,
    pub custom_fields: Vec<FieldElement>,
    pub proof: ScProof,
}

impl Certificate {
    /// Identifying hash over every field, proof included
    pub fn hash(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sc_cert");
        hasher.update(self.sc_id.as_bytes());
        hasher.update(&self.epoch_number.to_le_bytes());
        hasher.update(&self.quality.to_le_bytes());
        hasher.update(&(self.backward_transfers.len() as u64).to_le_bytes());
        for bt in &self.backward_transfers {
            hasher.update(&bt.pub_key_hash);
            hasher.update(&bt.amount.to_le_bytes());
        }
        hasher.update(&self.forward_transfer_sc_fee.to_le_bytes());
        hasher.update(&self.mainchain_bwt_request_sc_fee.to_le_bytes());
        hasher.update(&(self.custom_fields.len() as u64).to_le_bytes());
        for fe in &self.custom_fields {
            hasher.update(fe.as_bytes());
        }
        hasher.update(self.proof.as_bytes());
        Hash256(*hasher.finalize().as_bytes())
    }
}

/// Ceased sidechain withdrawal input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CswInput {
    pub sc_id: ScId,
    pub amount: u64,
    pub nullifier: FieldElement,
    /// Destination public key hash
    pub pub_key_hash: [u8; 20],
    /// Cumulative sidechain transaction commitment tree root at ceasing
    pub ceasing_cum_sc_tx_comm_tree: FieldElement,
    pub proof: ScProof,
}

/// Transaction carrying CSW inputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub csw_inputs: Vec<CswInput>,
    /// Remaining transparent inputs and outputs, not interpreted here
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> Hash256 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"sc_tx");
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&(self.csw_inputs.len() as u64).to_le_bytes());
        for csw in &self.csw_inputs {
            hasher.update(csw.sc_id.as_bytes());
            hasher.update(&csw.amount.to_le_bytes());
            hasher.update(csw.nullifier.as_bytes());
            hasher.update(&csw.pub_key_hash);
            hasher.update(csw.ceasing_cum_sc_tx_comm_tree.as_bytes());
            hasher.update(csw.proof.as_bytes());
        }
        hasher.update(&self.payload);
        Hash256(*hasher.finalize().as_bytes())
    }
}

/// Consensus state of a sidechain as seen by the verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidechainRecord {
    pub creation_block_height: u64,
    pub withdrawal_epoch_length: u32,
    /// Constant public input fixed at creation
    pub constant: Option<FieldElement>,
    pub cert_verification_key: VerificationKey,
    pub csw_verification_key: Option<VerificationKey>,
    pub current_epoch: Option<u32>,
    pub current_quality: Option<u64>,
    pub current_cert_hash: Option<Hash256>,
}

/// Either object whose proofs went through the verifier
#[derive(Debug, Clone)]
pub enum VerifiedSubject {
    Certificate(std::sync::Arc<Certificate>),
    Transaction(std::sync::Arc<Transaction>),
}

impl VerifiedSubject {
    pub fn hash(&self) -> Hash256 {
        match self {
            Self::Certificate(cert) => cert.hash(),
            Self::Transaction(tx) => tx.hash(),
        }
    }
}
