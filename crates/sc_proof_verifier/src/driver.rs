//! Periodic verification driver
//!
//! One background thread per verifier. Each iteration checks the cancellation
//! token, runs a cycle if the trigger conditions hold, then sleeps for the
//! wake-up period. A batch in progress always completes; cancellation is only
//! observed between cycles.

use crate::error::{Result, VerifierError};
use crate::verifier::AsyncProofVerifier;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Phase of the verification driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    Idle,
    Draining,
    Verifying,
    Dispatching,
    Stopped,
}

impl DriverState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Draining,
            2 => Self::Verifying,
            3 => Self::Dispatching,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
pub(crate) struct DriverStateCell(AtomicU8);

impl DriverStateCell {
    pub(crate) fn new(state: DriverState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn get(&self) -> DriverState {
        DriverState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: DriverState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cooperative cancellation shared between the driver and its handle
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        let _lock = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for at most `timeout`; returns true if cancelled
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut lock = self.inner.lock.lock();
        if self.is_cancelled() {
            return true;
        }
        self.inner.wake.wait_for(&mut lock, timeout);
        self.is_cancelled()
    }
}

/// Owner of a running driver thread.
///
/// Dropping the handle cancels the driver and waits for it to exit.
#[derive(Debug)]
pub struct DriverHandle {
    token: CancellationToken,
    state: Arc<DriverStateCell>,
    thread: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn state(&self) -> DriverState {
        self.state.get()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the driver and join its thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Proof verification driver panicked");
                self.state.set(DriverState::Stopped);
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub(crate) fn spawn(verifier: Arc<AsyncProofVerifier>, period: Duration) -> Result<DriverHandle> {
    let token = CancellationToken::new();
    let state = Arc::new(DriverStateCell::new(DriverState::Idle));

    let thread = {
        let token = token.clone();
        let state = Arc::clone(&state);
        std::thread::Builder::new()
            .name("sc-proof-verifier".to_string())
            .spawn(move || run(&verifier, &token, &state, period))
            .map_err(VerifierError::DriverSpawn)?
    };

    Ok(DriverHandle {
        token,
        state,
        thread: Some(thread),
    })
}

fn run(
    verifier: &AsyncProofVerifier,
    token: &CancellationToken,
    state: &DriverStateCell,
    period: Duration,
) {
    tracing::info!(
        wake_up_period_ms = period.as_millis() as u64,
        "Proof verification driver started"
    );

    loop {
        if token.is_cancelled() {
            break;
        }
        verifier.run_cycle(false, Some(state));
        if token.wait_timeout(period) {
            break;
        }
    }

    state.set(DriverState::Stopped);
    tracing::info!(
        pending_certs = verifier.pending_cert_count(),
        pending_csw = verifier.pending_csw_count(),
        "Proof verification driver stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_state_cell() {
        let cell = DriverStateCell::new(DriverState::Idle);
        for state in [
            DriverState::Draining,
            DriverState::Verifying,
            DriverState::Dispatching,
            DriverState::Stopped,
            DriverState::Idle,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }

    #[test]
    fn test_token_times_out() {
        let token = CancellationToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                let cancelled = token.wait_timeout(Duration::from_secs(30));
                (cancelled, start.elapsed())
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (cancelled, elapsed) = waiter.join().unwrap();
        assert!(cancelled);
        assert!(elapsed < Duration::from_secs(10));
        assert!(token.wait_timeout(Duration::from_secs(30)));
    }
}
