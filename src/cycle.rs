use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};
use parking_lot::Mutex;

use crate::ranking::RankedPoint;

/// Bookkeeping for discovery cycles: which result set is on display and the
/// last status message. Cycles may overlap; a result only lands if no newer
/// cycle has landed before it.
pub struct Cycles {
    issued: AtomicU64,
    state: Mutex<CycleState>,
}

struct CycleState {
    applied: u64,
    message: String,
    points: Vec<RankedPoint>,
}

impl Cycles {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            state: Mutex::new(CycleState {
                applied: 0,
                message: String::new(),
                points: Vec::new(),
            }),
        }
    }

    /// Starts a cycle and returns its generation.
    pub fn begin(&self, message: &str) -> u64 {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_message(message);
        generation
    }

    /// Replaces the displayed set wholesale. False when a newer cycle already
    /// landed, in which case nothing changes.
    pub fn complete(&self, generation: u64, points: Vec<RankedPoint>, message: String) -> bool {
        let mut state = self.state.lock();
        if generation <= state.applied {
            debug!("dropping stale cycle {} (showing {})", generation, state.applied);
            return false;
        }
        info!("Cycle {}: {}", generation, message);
        state.applied = generation;
        state.points = points;
        state.message = message;
        true
    }

    /// Records a failure but keeps the last good result set. Only the newest
    /// started cycle may report one; older failures are dropped.
    pub fn fail(&self, generation: u64, message: String) -> bool {
        let mut state = self.state.lock();
        let newest = self.issued.load(Ordering::SeqCst);
        if generation <= state.applied || generation < newest {
            debug!("dropping stale failure of cycle {} (newest {})", generation, newest);
            return false;
        }
        info!("Cycle {}: {}", generation, message);
        state.message = message;
        true
    }

    pub fn set_message(&self, message: &str) {
        self.state.lock().message = message.to_string();
    }

    pub fn message(&self) -> String {
        self.state.lock().message.clone()
    }

    pub fn points(&self) -> Vec<RankedPoint> {
        self.state.lock().points.clone()
    }

    pub fn applied(&self) -> u64 {
        self.state.lock().applied
    }
}

impl Default for Cycles {
    fn default() -> Self {
        Self::new()
    }
}
