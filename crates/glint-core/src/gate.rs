//! Reentrancy guard for the per-frame pipeline.
//!
//! A frame is only handed to the processor while no other frame is in
//! flight; frames that arrive in the meantime are dropped, never queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct GateState {
    busy: AtomicBool,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

/// Shared admission gate. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct FrameGate {
    state: Arc<GateState>,
}

/// Proof that the holder owns the pipeline. Releases the gate on drop.
#[derive(Debug)]
#[must_use = "dropping the permit immediately reopens the gate"]
pub struct GatePermit {
    state: Arc<GateState>,
}

impl FrameGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to enter. Returns `None` (and counts a dropped frame) if a
    /// previous permit is still alive.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        if self
            .state
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.state.accepted.fetch_add(1, Ordering::Relaxed);
            Some(GatePermit {
                state: Arc::clone(&self.state),
            })
        } else {
            self.state.dropped.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.busy.load(Ordering::Acquire)
    }

    pub fn accepted(&self) -> u64 {
        self.state.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.state.busy.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_permit() {
        let gate = FrameGate::new();
        let permit = gate.try_acquire().expect("first acquire");
        assert!(gate.is_busy());
        assert!(gate.try_acquire().is_none());
        assert!(gate.try_acquire().is_none());
        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
        assert_eq!(gate.accepted(), 2);
        assert_eq!(gate.dropped(), 2);
    }

    #[test]
    fn test_permit_released_on_other_thread() {
        let gate = FrameGate::new();
        let permit = gate.try_acquire().unwrap();
        let clone = gate.clone();
        std::thread::spawn(move || drop(permit)).join().unwrap();
        assert!(clone.try_acquire().is_some());
    }
}
