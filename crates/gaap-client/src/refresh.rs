//! Single-flight token refresh.
//!
//! When several calls fail with 401 at once, exactly one of them (the leader)
//! performs the refresh. The others enqueue a waiter and park until the
//! leader settles. Settling wakes every waiter in arrival order with the same
//! outcome and returns the coordinator to idle.
//!
//! # State machine
//!
//! ```text
//!        run() while Idle                 leader settles
//!  Idle ─────────────────► Refreshing ───────────────────► Idle
//!                           │      ▲      (waiters woken FIFO)
//!                           └──────┘
//!                    run() while Refreshing
//!                      (enqueue waiter)
//! ```
//!
//! The state lives behind a `std::sync::Mutex` that is only ever held for a
//! few instructions and never across an `.await`.
//!
//! # Cancellation
//!
//! A leader dropped mid-refresh (caller cancelled, runtime shut down) settles
//! with [`RefreshOutcome::Failed`] from its drop guard, so waiters can never be
//! stranded. A waiter whose sender is dropped without a value also reads
//! `Failed`.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

/// How a refresh attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New credentials are stored; retry the original call
    Refreshed,
    /// Refresh failed or was abandoned; surface the original error
    Failed,
}

enum Phase {
    Idle,
    Refreshing { waiters: VecDeque<oneshot::Sender<RefreshOutcome>> },
}

struct RefreshState {
    /// Bumped by [`RefreshCoordinator::reset`]. A leader only settles the
    /// phase it started.
    generation: u64,
    phase: Phase,
}

enum Role {
    Leader(u64),
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Ensures at most one refresh is in flight per client.
///
/// # Invariants
///
/// - At most one leader per generation
/// - Every waiter enqueued during a refresh receives exactly that refresh's
///   outcome, in FIFO order
/// - After settling, the coordinator is idle and a later 401 starts a new
///   refresh
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    /// Idle coordinator.
    pub fn new() -> Self {
        Self { state: Mutex::new(RefreshState { generation: 0, phase: Phase::Idle }) }
    }

    /// Run `refresh` if no refresh is in flight, otherwise wait for the one
    /// that is.
    ///
    /// `refresh` resolves to `true` if new credentials were stored. It is
    /// invoked at most once, and only by the leader.
    pub async fn run<F, Fut>(&self, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let role = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match &mut state.phase {
                Phase::Idle => {
                    state.phase = Phase::Refreshing { waiters: VecDeque::new() };
                    Role::Leader(state.generation)
                },
                Phase::Refreshing { waiters } => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push_back(tx);
                    Role::Waiter(rx)
                },
            }
        };

        match role {
            Role::Waiter(rx) => {
                tracing::debug!("refresh in flight, waiting");
                rx.await.unwrap_or(RefreshOutcome::Failed)
            },
            Role::Leader(generation) => {
                tracing::debug!(generation, "starting token refresh");
                let mut guard = LeaderGuard { coordinator: self, generation, settled: false };

                let outcome =
                    if refresh().await { RefreshOutcome::Refreshed } else { RefreshOutcome::Failed };

                guard.settle(outcome);
                outcome
            },
        }
    }

    /// Abandon any refresh in flight.
    ///
    /// Pending waiters read [`RefreshOutcome::Failed`]; the abandoned leader's
    /// result is discarded. Called when credentials are replaced (login) or
    /// cleared (logout).
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation = state.generation.wrapping_add(1);
        // Dropping the senders wakes the waiters with Failed.
        state.phase = Phase::Idle;
    }

    /// True while a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().phase, Phase::Refreshing { .. })
    }

    /// Number of callers parked behind the current refresh.
    pub fn waiting(&self) -> usize {
        match &self.lock().phase {
            Phase::Idle => 0,
            Phase::Refreshing { waiters } => waiters.len(),
        }
    }

    fn settle(&self, generation: u64, outcome: RefreshOutcome) {
        let waiters = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            match std::mem::replace(&mut state.phase, Phase::Idle) {
                Phase::Idle => VecDeque::new(),
                Phase::Refreshing { waiters } => waiters,
            }
        };

        tracing::debug!(?outcome, waiters = waiters.len(), "token refresh settled");
        for waiter in waiters {
            // Receiver gone means that caller was cancelled.
            let _ = waiter.send(outcome);
        }
    }

    // Every critical section is a single state transition, so a poisoned
    // lock still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Settles the leader's generation with `Failed` if the leader is dropped
/// before it settles normally.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(&mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(self.generation, outcome);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(generation = self.generation, "refresh leader dropped before settling");
            self.coordinator.settle(self.generation, RefreshOutcome::Failed);
        }
    }
}
