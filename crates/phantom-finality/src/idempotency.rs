//! Settlement idempotency guard.
//!
//! A round is handed to settlement at most once. Marking the same
//! [`RoundId`] twice returns [`PhantomError::AlreadySettled`]. The set is
//! bounded; the oldest entries fall out first, so memory stays flat in a
//! long-running node.

use std::collections::{HashSet, VecDeque};

use phantom_types::{PhantomError, Result, RoundId};

pub struct IdempotencyGuard {
    settled: HashSet<RoundId>,
    /// Insertion order, front = oldest.
    order: VecDeque<RoundId>,
    max_size: usize,
}

impl IdempotencyGuard {
    /// `max_size` is raised to 1 if zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            settled: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// # Errors
    /// `AlreadySettled` if `round` was marked before and is still remembered.
    pub fn mark_settled(&mut self, round: RoundId) -> Result<()> {
        if self.settled.contains(&round) {
            return Err(PhantomError::AlreadySettled(round));
        }
        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled.insert(round);
        self.order.push_back(round);
        Ok(())
    }

    /// Forget a round whose handoff failed so it can be retried.
    pub fn unmark(&mut self, round: &RoundId) {
        if self.settled.remove(round) {
            self.order.retain(|r| r != round);
        }
    }

    pub fn is_settled(&self, round: &RoundId) -> bool {
        self.settled.contains(round)
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}
