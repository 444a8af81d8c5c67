//! Run-scoped termination flag
//!
//! The pagination engine checks it before every cycle and card, detail tasks
//! check it before offering a record. The first reason recorded wins.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Why a crawl run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TerminationReason {
    /// Still running
    #[default]
    None,

    /// The result cap was reached
    MaxResultsReached,

    /// No further results to load
    Exhausted,

    /// An unrecoverable error ended the run
    FatalError,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MaxResultsReached => "max_results_reached",
            Self::Exhausted => "exhausted",
            Self::FatalError => "fatal_error",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Termination flag shared by every task of one run
#[derive(Debug, Default)]
pub struct RunControl {
    terminated: AtomicBool,
    reason: Mutex<TerminationReason>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the flag; returns false if the run was already terminated
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        let mut current = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != TerminationReason::None {
            return false;
        }
        *current = reason;
        self.terminated.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> TerminationReason {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
