//! Rendezvous points.
//!
//! An RVP counts down the completions of the actions of one phase. The
//! completion that brings the count to zero fires it, exactly once. A midway
//! RVP then builds the next phase; the terminal RVP commits or aborts.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::Workload;
use crate::action::Action;
use crate::cache::{Cacheable, Pooled};
use crate::enqueue::Forward;
use crate::error::TrxError;

/// Index of an RVP in its transaction's chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RvpId(pub(crate) usize);

impl RvpId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Data a phase leaves for the next one.
pub trait PhaseBody<W: Workload>: Default + Send + 'static {
    /// Builds the next phase when a midway RVP fires without failures. Every
    /// action pushed into `next` reports to the successor RVP.
    fn forward(&mut self, next: &mut Forward<'_, W>) -> Result<(), TrxError> {
        let _ = next;
        Ok(())
    }

    /// Result payload, taken from the terminal RVP once the transaction
    /// committed.
    fn output(&mut self) -> W::Output {
        W::Output::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum RvpKind {
    Midway {
        next: RvpId,
    },
    #[default]
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum RvpState {
    Armed = 0,
    Fired = 1,
    Retired = 2,
}

pub struct Rvp<W: Workload> {
    kind: RvpKind,
    countdown: AtomicUsize,
    total: usize,
    state: AtomicU8,
    completed: Mutex<Vec<Pooled<Action<W>>>>,
    phase: Mutex<W::Phase>,
}

impl<W: Workload> Rvp<W> {
    pub(crate) fn arm(&mut self, kind: RvpKind, countdown: usize, phase: W::Phase) {
        self.kind = kind;
        *self.countdown.get_mut() = countdown;
        self.total = countdown;
        *self.state.get_mut() = RvpState::Armed as u8;
        *self.phase.get_mut() = phase;
    }

    pub(crate) fn kind(&self) -> RvpKind {
        self.kind
    }

    /// Actions this RVP waits for in total.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Actions that still have to report.
    pub fn outstanding(&self) -> usize {
        self.countdown.load(Ordering::Acquire)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == RvpKind::Terminal
    }

    pub fn phase(&self) -> MutexGuard<'_, W::Phase> {
        self.phase.lock()
    }

    pub(crate) fn state(&self) -> RvpState {
        match self.state.load(Ordering::Acquire) {
            0 => RvpState::Armed,
            1 => RvpState::Fired,
            _ => RvpState::Retired,
        }
    }

    pub(crate) fn push_completed(&self, action: Pooled<Action<W>>) {
        self.completed.lock().push(action);
    }

    /// Moves the completed actions into `into`.
    pub(crate) fn hand_over(&self, into: &Rvp<W>) {
        let actions = std::mem::take(&mut *self.completed.lock());
        into.completed.lock().extend(actions);
    }

    pub(crate) fn take_completed(&self) -> Vec<Pooled<Action<W>>> {
        std::mem::take(&mut *self.completed.lock())
    }

    /// Records one completion. Returns `Ok(true)` for the completion that
    /// reached zero, and an error when more completions arrive than expected.
    pub(crate) fn post(&self) -> Result<bool, TrxError> {
        match self
            .countdown
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(prev) => Ok(prev == 1),
            Err(_) => Err(TrxError::Internal(
                "rendezvous point received more completions than it waits for".into(),
            )),
        }
    }

    /// Armed to Fired. Only one caller ever wins.
    pub(crate) fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(
                RvpState::Armed as u8,
                RvpState::Fired as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn retire(&self) {
        self.state.store(RvpState::Retired as u8, Ordering::Release);
    }
}

impl<W: Workload> Default for Rvp<W> {
    fn default() -> Self {
        Self {
            kind: RvpKind::Terminal,
            countdown: AtomicUsize::new(0),
            total: 0,
            state: AtomicU8::new(RvpState::Retired as u8),
            completed: Mutex::new(Vec::new()),
            phase: Mutex::new(W::Phase::default()),
        }
    }
}

impl<W: Workload> Cacheable for Rvp<W> {
    fn reset(&mut self) {
        self.kind = RvpKind::Terminal;
        *self.countdown.get_mut() = 0;
        self.total = 0;
        *self.state.get_mut() = RvpState::Retired as u8;
        self.completed.get_mut().clear();
        *self.phase.get_mut() = W::Phase::default();
    }
}

impl<W: Workload> fmt::Debug for Rvp<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rvp")
            .field("kind", &self.kind)
            .field("outstanding", &self.outstanding())
            .field("total", &self.total)
            .field("state", &self.state())
            .finish()
    }
}
