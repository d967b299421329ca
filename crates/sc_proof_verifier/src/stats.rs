//! Best-effort verification counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    ok_cert: AtomicU64,
    failed_cert: AtomicU64,
    ok_csw: AtomicU64,
    failed_csw: AtomicU64,
    removed_from_queue: AtomicU64,
    discarded: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_cert(&self, passed: bool) {
        let counter = if passed { &self.ok_cert } else { &self.failed_cert };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_csw(&self, passed: bool) {
        let counter = if passed { &self.ok_csw } else { &self.failed_csw };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_removed_from_queue(&self, n: u64) {
        self.removed_from_queue.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn add_discarded(&self, n: u64) {
        self.discarded.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> VerifierStats {
        VerifierStats {
            ok_cert_count: self.ok_cert.load(Ordering::Relaxed),
            failed_cert_count: self.failed_cert.load(Ordering::Relaxed),
            ok_csw_count: self.ok_csw.load(Ordering::Relaxed),
            failed_csw_count: self.failed_csw.load(Ordering::Relaxed),
            removed_from_queue_count: self.removed_from_queue.load(Ordering::Relaxed),
            discarded_count: self.discarded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.ok_cert,
            &self.failed_cert,
            &self.ok_csw,
            &self.failed_csw,
            &self.removed_from_queue,
            &self.discarded,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Snapshot of the verifier counters.
///
/// CSW counts are per transaction, not per input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierStats {
    pub ok_cert_count: u64,
    pub failed_cert_count: u64,
    pub ok_csw_count: u64,
    pub failed_csw_count: u64,
    /// Pending requests dropped because a cached result already existed
    pub removed_from_queue_count: u64,
    /// In-flight requests dropped without dispatch
    pub discarded_count: u64,
}
