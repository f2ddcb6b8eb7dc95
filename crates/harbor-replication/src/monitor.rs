//! Minimum unapplied log address tracking.

use std::collections::BTreeMap;

use parking_lot::{Condvar, Mutex};

use harbor_common::types::Lsa;

/// Tracks the smallest log address still unapplied across the producer and
/// every in-flight job.
///
/// The monitor is a reservation structure: the producer publishes its
/// decode frontier after each record, and every job reserves its address
/// when it enters the engine and retracts it on completion. A job sitting
/// in a queue is therefore never invisible to the minimum.
#[derive(Debug, Default)]
pub struct MinLsaMonitor {
    inner: Mutex<MonitorState>,
    minimum_advanced: Condvar,
}

#[derive(Debug, Default)]
struct MonitorState {
    producer_frontier: Option<Lsa>,
    // Multiset: several jobs can share one record address.
    in_flight: BTreeMap<Lsa, usize>,
}

impl MonitorState {
    fn minimum(&self) -> Option<Lsa> {
        let job_min = self.in_flight.keys().next().copied();
        match (job_min, self.producer_frontier) {
            (Some(job), Some(frontier)) => Some(job.min(frontier)),
            (Some(job), None) => Some(job),
            (None, frontier) => frontier,
        }
    }
}

impl MinLsaMonitor {
    /// Creates a monitor with no entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the producer's decode frontier.
    pub fn set_producer_frontier(&self, lsa: Lsa) {
        let mut state = self.inner.lock();
        state.producer_frontier = Some(lsa);
        drop(state);
        self.minimum_advanced.notify_all();
    }

    /// Reserves a job's record address.
    pub fn reserve(&self, lsa: Lsa) {
        let mut state = self.inner.lock();
        *state.in_flight.entry(lsa).or_insert(0) += 1;
    }

    /// Retracts a completed job's reservation.
    pub fn retract(&self, lsa: Lsa) {
        let mut state = self.inner.lock();
        match state.in_flight.get_mut(&lsa) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                state.in_flight.remove(&lsa);
            }
            None => debug_assert!(false, "retract without a matching reserve"),
        }
        drop(state);
        self.minimum_advanced.notify_all();
    }

    /// Smallest address still unapplied; null until the producer publishes.
    #[must_use]
    pub fn get_minimum(&self) -> Lsa {
        self.inner.lock().minimum().unwrap_or(Lsa::NULL)
    }

    /// Blocks until the minimum is strictly past `target`.
    pub fn wait_past_target_lsa(&self, target: Lsa) {
        let mut state = self.inner.lock();
        self.minimum_advanced
            .wait_while(&mut state, |state| match state.minimum() {
                Some(minimum) => minimum <= target,
                None => true,
            });
    }
}
