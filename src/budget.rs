//! Time and page ceilings shared by every extractor in a run.
//!
//! A budget starts `Active` and moves to `Exhausted` once the deadline passes
//! or the last page is taken. The transition is one-way: an exhausted budget
//! never becomes active again, and every later fetch short-circuits with
//! [`RestlessError::BudgetExhausted`] without touching the network.

use crate::types::{RestlessError, Result};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Observable state of a [`Budget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Active,
    Exhausted,
}

/// Upper bound on a run's deadline; longer budgets are clamped to it.
pub const MAX_BUDGET_TIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Deadline plus an atomically decremented page allowance.
///
/// A budget may be an allowance carved out of a parent: it shares the
/// parent's deadline, and every page it grants is also taken from the parent,
/// so the parent stays the global cap.
#[derive(Debug)]
pub struct Budget {
    deadline: Instant,
    total_pages: u32,
    remaining_pages: AtomicU32,
    exhausted: AtomicBool,
    parent: Option<Arc<Budget>>,
}

impl Budget {
    /// Create a budget that expires `time` from now and allows `pages` fetches.
    pub fn new(time: Duration, pages: u32) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(time.min(MAX_BUDGET_TIME))
            .unwrap_or(now + MAX_BUDGET_TIME);
        Self::with_deadline(deadline, pages, None)
    }

    fn with_deadline(deadline: Instant, pages: u32, parent: Option<Arc<Budget>>) -> Self {
        Self {
            deadline,
            total_pages: pages,
            remaining_pages: AtomicU32::new(pages),
            exhausted: AtomicBool::new(pages == 0),
            parent,
        }
    }

    /// Carve an allowance of at most `pages` out of `parent`.
    pub fn allowance(parent: &Arc<Budget>, pages: u32) -> Self {
        Self::with_deadline(parent.deadline, pages, Some(parent.clone()))
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Current state, latching `Exhausted` the first time it is observed.
    pub fn state(&self) -> BudgetState {
        if self.exhausted.load(Ordering::Acquire) {
            return BudgetState::Exhausted;
        }

        let parent_exhausted = self
            .parent
            .as_ref()
            .is_some_and(|p| p.state() == BudgetState::Exhausted);

        if parent_exhausted
            || Instant::now() >= self.deadline
            || self.remaining_pages.load(Ordering::Acquire) == 0
        {
            self.exhaust();
            return BudgetState::Exhausted;
        }

        BudgetState::Active
    }

    pub fn is_active(&self) -> bool {
        self.state() == BudgetState::Active
    }

    /// Force the budget into the terminal state.
    pub fn exhaust(&self) {
        self.exhausted.store(true, Ordering::Release);
    }

    /// Time left until the deadline (zero once passed).
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Pages this budget can still grant, never more than its parent has left.
    pub fn remaining_pages(&self) -> u32 {
        let own = self.remaining_pages.load(Ordering::Acquire);
        match &self.parent {
            Some(parent) => own.min(parent.remaining_pages()),
            None => own,
        }
    }

    /// Pages taken so far.
    pub fn pages_used(&self) -> u32 {
        self.total_pages - self.remaining_pages.load(Ordering::Acquire)
    }

    /// Reserve one page for a request that is about to start.
    ///
    /// The check and the decrement are a single compare-and-swap, so when one
    /// page remains exactly one concurrent caller wins it. An allowance takes
    /// its own page first and then one from its parent; a page lost that way
    /// is not refunded.
    pub fn take_page(&self) -> Result<()> {
        if self.state() == BudgetState::Exhausted {
            return Err(RestlessError::BudgetExhausted);
        }

        if self
            .remaining_pages
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_err()
        {
            self.exhaust();
            return Err(RestlessError::BudgetExhausted);
        }

        if let Some(parent) = &self.parent {
            if let Err(e) = parent.take_page() {
                self.exhaust();
                return Err(e);
            }
        }

        Ok(())
    }
}
