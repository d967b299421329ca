//! Read-only view of sidechain consensus state

use crate::types::{FieldElement, ScId, SidechainRecord};
use std::collections::HashMap;

/// Read-only access to the consensus state the extractor needs.
///
/// Owned by the consensus layer; the verifier only reads through it.
pub trait SidechainView {
    /// Creation parameters and current state of a sidechain
    fn sidechain(&self, sc_id: &ScId) -> Option<SidechainRecord>;

    /// Data hash of the sidechain's active certificate, if one was ever accepted
    fn active_cert_data_hash(&self, sc_id: &ScId) -> Option<FieldElement>;

    /// Cumulative sidechain transaction commitment tree root of the block at `height`
    fn cum_commitment_tree_root(&self, height: u64) -> Option<FieldElement>;
}

/// In-memory [`SidechainView`]
#[derive(Debug, Clone, Default)]
pub struct MemorySidechainView {
    sidechains: HashMap<ScId, SidechainRecord>,
    active_cert_data: HashMap<ScId, FieldElement>,
    commitment_roots: HashMap<u64, FieldElement>,
}

impl MemorySidechainView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_sidechain(&mut self, sc_id: ScId, record: SidechainRecord) {
        self.sidechains.insert(sc_id, record);
    }

    pub fn set_active_cert_data_hash(&mut self, sc_id: ScId, hash: FieldElement) {
        self.active_cert_data.insert(sc_id, hash);
    }

    pub fn set_cum_commitment_tree_root(&mut self, height: u64, root: FieldElement) {
        self.commitment_roots.insert(height, root);
    }
}

impl SidechainView for MemorySidechainView {
    fn sidechain(&self, sc_id: &ScId) -> Option<SidechainRecord> {
        self.sidechains.get(sc_id).cloned()
    }

    fn active_cert_data_hash(&self, sc_id: &ScId) -> Option<FieldElement> {
        self.active_cert_data.get(sc_id).copied()
    }

    fn cum_commitment_tree_root(&self, height: u64) -> Option<FieldElement> {
        self.commitment_roots.get(&height).copied()
    }
}
