//! Low-priority pause gate
//!
//! Latency-sensitive work (validating a freshly received block) takes a
//! [`PauseGuard`] to borrow CPU from the background verifier. While any guard
//! is held the proving backend is told to pause its low-priority threads and
//! the driver cannot start a new batch. A batch already past the hand-off keeps
//! running.
//!
//! ```
//! # use std::sync::Arc;
//! # use sc_proof_verifier::{BatchCoordinator, SchnorrProvingSystem};
//! let coordinator = BatchCoordinator::new(Arc::new(SchnorrProvingSystem::new()));
//! {
//!     let _pause = coordinator.pause(true);
//!     assert!(coordinator.try_acquire_batch_slot().is_none());
//! }
//! assert!(coordinator.try_acquire_batch_slot().is_some());
//! ```

use crate::proving::ProvingSystem;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Grants batch slots to the driver unless paused
pub struct BatchCoordinator {
    proving: Arc<dyn ProvingSystem>,
    /// Number of live pause guards
    pauses: Mutex<usize>,
}

impl BatchCoordinator {
    pub fn new(proving: Arc<dyn ProvingSystem>) -> Self {
        Self {
            proving,
            pauses: Mutex::new(0),
        }
    }

    /// Pause low-priority verification if `requested`, until the guard drops.
    ///
    /// Waits for an ongoing queue hand-off to finish, never for verification.
    pub fn pause(&self, requested: bool) -> PauseGuard<'_> {
        if requested {
            let mut pauses = self.pauses.lock();
            if *pauses == 0 {
                self.proving.pause_low_priority_threads();
                tracing::debug!("Low-priority proof verification paused");
            }
            *pauses += 1;
        }
        PauseGuard {
            coordinator: self,
            active: requested,
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.pauses.lock() > 0
    }

    /// Slot for starting a new batch, or `None` while paused.
    ///
    /// Pausing blocks until the slot is released, so hold it only across the
    /// queue hand-off.
    pub fn try_acquire_batch_slot(&self) -> Option<BatchSlot<'_>> {
        let pauses = self.pauses.lock();
        (*pauses == 0).then_some(BatchSlot { _pauses: pauses })
    }

    fn release(&self) {
        let mut pauses = self.pauses.lock();
        *pauses = pauses.saturating_sub(1);
        if *pauses == 0 {
            self.proving.resume_low_priority_threads();
            tracing::debug!("Low-priority proof verification resumed");
        }
    }
}

/// Held while low-priority verification is paused
#[must_use = "verification resumes as soon as the guard is dropped"]
pub struct PauseGuard<'a> {
    coordinator: &'a BatchCoordinator,
    active: bool,
}

impl PauseGuard<'_> {
    /// True if this guard actually paused verification
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.coordinator.release();
        }
    }
}

/// Permission to move pending requests into a new batch
pub struct BatchSlot<'a> {
    _pauses: MutexGuard<'a, usize>,
}
