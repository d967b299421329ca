//! Asynchronous proof verifier service
//!
//! [`AsyncProofVerifier`] wires the queue, batch verifier, pause gate and
//! dispatcher together. The node owns one instance and shares it with its
//! message handlers (producers) and with the driver thread.
//!
//! ```
//! # use std::sync::Arc;
//! # use sc_proof_verifier::*;
//! struct Ignore;
//!
//! impl VerificationListener for Ignore {
//!     fn on_proof_verified(
//!         &self,
//!         _subject: VerifiedSubject,
//!         _origin: Option<NodeId>,
//!         _outcome: VerificationOutcome,
//!         _state: ValidationState,
//!     ) {
//!     }
//! }
//!
//! let verifier = AsyncProofVerifier::new(
//!     VerifierConfig::default(),
//!     Arc::new(SchnorrProvingSystem::new()),
//!     Arc::new(Ignore),
//! )
//! .unwrap();
//! assert_eq!(verifier.pending_cert_count(), 0);
//! assert_eq!(verifier.process_pending(false), CycleOutcome::NotTriggered);
//! ```

use crate::batch::{BatchVerifier, VerificationMode};
use crate::config::{BatchLimits, VerifierConfig};
use crate::dispatch::{CachedVerdict, ResultDispatcher, VerificationListener};
use crate::driver::{self, DriverHandle, DriverState, DriverStateCell};
use crate::error::Result;
use crate::input::{extract_cert_inputs, extract_csw_inputs};
use crate::pause::{BatchCoordinator, PauseGuard};
use crate::proving::ProvingSystem;
use crate::queue::AsyncProofQueue;
use crate::stats::VerifierStats;
use crate::types::{Certificate, Hash256, NodeId, Transaction};
use crate::view::SidechainView;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// What a single driver cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Trigger conditions not met
    NotTriggered,
    /// Low-priority verification is paused
    Paused,
    Completed {
        /// Certificates and transactions purged as already resolved
        removed: usize,
        /// Single-proof requests verified
        verified: usize,
        /// Certificates and transactions dispatched
        dispatched: usize,
    },
}

/// Background verifier for certificate and CSW proofs
pub struct AsyncProofVerifier {
    config: VerifierConfig,
    limits: BatchLimits,
    queue: AsyncProofQueue,
    batch_verifier: BatchVerifier,
    coordinator: BatchCoordinator,
    dispatcher: ResultDispatcher,
    /// Serializes cycles so one in-flight batch exists at a time
    cycle: Mutex<()>,
}

impl AsyncProofVerifier {
    pub fn new(
        config: VerifierConfig,
        proving: Arc<dyn ProvingSystem>,
        listener: Arc<dyn VerificationListener>,
    ) -> Result<Self> {
        config.validate()?;
        let limits = config.batch_limits();

        tracing::debug!(
            max_delay_ms = limits.max_delay.as_millis() as u64,
            max_size = limits.max_size,
            cache_capacity = config.cache_capacity,
            "Creating async proof verifier"
        );

        Ok(Self {
            limits,
            queue: AsyncProofQueue::new(),
            batch_verifier: BatchVerifier::new(Arc::clone(&proving), VerificationMode::Strict),
            coordinator: BatchCoordinator::new(proving),
            dispatcher: ResultDispatcher::new(listener, config.cache_capacity),
            cycle: Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn batch_limits(&self) -> BatchLimits {
        self.limits
    }

    /// Queue a certificate for proof verification.
    ///
    /// Fails if the certificate cannot be resolved against `view`; that is a
    /// caller bug, not an invalid proof.
    pub fn enqueue_cert_verification(
        &self,
        view: &dyn SidechainView,
        certificate: Arc<Certificate>,
        origin: Option<NodeId>,
    ) -> Result<()> {
        let request = extract_cert_inputs(view, &certificate, origin)?;
        tracing::trace!(cert = %request.cert_hash, ?origin, "Certificate queued for proof verification");
        self.queue.enqueue_cert(request, Instant::now());
        Ok(())
    }

    /// Queue every CSW input of a transaction for proof verification
    pub fn enqueue_csw_verification(
        &self,
        view: &dyn SidechainView,
        transaction: Arc<Transaction>,
        origin: Option<NodeId>,
    ) -> Result<()> {
        let requests = extract_csw_inputs(view, &transaction, origin)?;
        tracing::trace!(
            tx = %transaction.hash(),
            inputs = requests.len(),
            ?origin,
            "Transaction queued for CSW proof verification"
        );
        self.queue.enqueue_csw(requests, Instant::now());
        Ok(())
    }

    pub fn pending_cert_count(&self) -> usize {
        self.queue.pending_cert_count()
    }

    /// Number of pending transactions with CSW inputs
    pub fn pending_csw_count(&self) -> usize {
        self.queue.pending_csw_count()
    }

    pub fn stats(&self) -> VerifierStats {
        self.dispatcher.stats()
    }

    pub fn reset_stats(&self) {
        self.dispatcher.reset_stats();
    }

    /// Cached verdict for a certificate or transaction hash
    pub fn cached_result(&self, hash: &Hash256) -> Option<CachedVerdict> {
        self.dispatcher.cached(hash)
    }

    pub fn cache_len(&self) -> usize {
        self.dispatcher.cache_len()
    }

    /// Drop the whole in-flight batch without dispatching it
    pub fn discard_all(&self) -> usize {
        let discarded = self.queue.discard_all_in_flight();
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded in-flight proof verifications");
            self.dispatcher.record_discarded(discarded);
        }
        discarded
    }

    /// Drop one in-flight certificate or transaction without dispatching it
    pub fn discard_one(&self, hash: &Hash256) -> bool {
        let discarded = self.queue.discard_in_flight(hash);
        if discarded {
            tracing::debug!(%hash, "Discarded in-flight proof verification");
            self.dispatcher.record_discarded(1);
        }
        discarded
    }

    /// Hold off new batches while the returned guard lives, if `requested`
    pub fn pause_low_priority(&self, requested: bool) -> PauseGuard<'_> {
        self.coordinator.pause(requested)
    }

    /// Clear pending and in-flight requests, cached results and statistics
    pub fn reset(&self) {
        let _cycle = self.cycle.lock();
        self.queue.clear();
        self.dispatcher.clear_cache();
        self.dispatcher.reset_stats();
        tracing::debug!("Async proof verifier reset");
    }

    /// Run one driver cycle on the calling thread.
    ///
    /// `force` starts a batch regardless of the trigger conditions, but never
    /// while paused. Must not be called from a [`VerificationListener`].
    pub fn process_pending(&self, force: bool) -> CycleOutcome {
        self.run_cycle(force, None)
    }

    /// Start the background driver
    pub fn spawn_driver(self: &Arc<Self>) -> Result<DriverHandle> {
        driver::spawn(Arc::clone(self), self.config.wake_up_period())
    }

    fn should_start_batch(&self, now: Instant) -> bool {
        let pending = self.queue.pending_len();
        if pending == 0 {
            return false;
        }
        pending > self.limits.max_size
            || self
                .queue
                .oldest_pending_age(now)
                .is_some_and(|age| age > self.limits.max_delay)
    }

    pub(crate) fn run_cycle(&self, force: bool, state: Option<&DriverStateCell>) -> CycleOutcome {
        let set_state = |s: DriverState| {
            if let Some(state) = state {
                state.set(s);
            }
        };

        let _cycle = self.cycle.lock();
        if !force && !self.should_start_batch(Instant::now()) {
            return CycleOutcome::NotTriggered;
        }

        let Some(slot) = self.coordinator.try_acquire_batch_slot() else {
            tracing::trace!("Proof verification paused, batch postponed");
            return CycleOutcome::Paused;
        };

        set_state(DriverState::Draining);
        let drained = self
            .queue
            .drain_into_in_flight(|hash| self.dispatcher.is_cached(hash));
        drop(slot);

        if drained.removed > 0 {
            tracing::debug!(removed = drained.removed, "Dropped already verified requests from queue");
            self.dispatcher.record_removed_from_queue(drained.removed);
        }

        if drained.batch.is_empty() {
            set_state(DriverState::Idle);
            return CycleOutcome::Completed {
                removed: drained.removed,
                verified: 0,
                dispatched: 0,
            };
        }

        set_state(DriverState::Verifying);
        let start = Instant::now();
        let results = self.batch_verifier.verify(&drained.batch);

        set_state(DriverState::Dispatching);
        let resolved = self.queue.take_in_flight();
        let dispatched = self.dispatcher.dispatch(resolved, &results);

        let leftover = self.queue.in_flight_len();
        if leftover > 0 {
            tracing::error!(leftover, "In-flight batch not empty after dispatch");
        }
        debug_assert_eq!(leftover, 0);

        tracing::debug!(
            requests = drained.batch.len(),
            dispatched,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Proof verification cycle complete"
        );

        set_state(DriverState::Idle);
        CycleOutcome::Completed {
            removed: drained.removed,
            verified: drained.batch.len(),
            dispatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ValidationState, VerificationOutcome};
    use crate::proving::SchnorrProvingSystem;
    use crate::types::VerifiedSubject;

    #[derive(Default)]
    struct Counter(Mutex<usize>);

    impl VerificationListener for Counter {
        fn on_proof_verified(
            &self,
            _subject: VerifiedSubject,
            _origin: Option<NodeId>,
            _outcome: VerificationOutcome,
            _state: ValidationState,
        ) {
            *self.0.lock() += 1;
        }
    }

    fn verifier(config: VerifierConfig) -> Result<AsyncProofVerifier> {
        AsyncProofVerifier::new(
            config,
            Arc::new(SchnorrProvingSystem::new()),
            Arc::new(Counter::default()),
        )
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = VerifierConfig {
            wake_up_period_ms: 0,
            ..VerifierConfig::default()
        };
        assert!(verifier(config).is_err());
    }

    #[test]
    fn test_empty_cycle() {
        let verifier = verifier(VerifierConfig::test_mode()).unwrap();
        assert_eq!(verifier.process_pending(false), CycleOutcome::NotTriggered);
        assert_eq!(
            verifier.process_pending(true),
            CycleOutcome::Completed {
                removed: 0,
                verified: 0,
                dispatched: 0
            }
        );
    }

    #[test]
    fn test_forced_cycle_respects_pause() {
        let verifier = verifier(VerifierConfig::test_mode()).unwrap();
        let _pause = verifier.pause_low_priority(true);
        assert_eq!(verifier.process_pending(true), CycleOutcome::Paused);
    }

    #[test]
    fn test_negative_limits_resolved_once() {
        let config = VerifierConfig {
            max_batch_size: -1,
            ..VerifierConfig::default()
        };
        let verifier = verifier(config).unwrap();
        assert_eq!(verifier.batch_limits().max_size, 10);
        assert_eq!(verifier.config().max_batch_size, -1);
    }
}
