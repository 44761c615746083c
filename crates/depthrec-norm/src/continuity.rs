//! Update-id continuity over a sequence of kept deltas.
//!
//! A delta `U..=u` continues the previous one when `U <= prev_u + 1 <= u`.
//! The first delta, and the first after a gap, always continue.

use crate::audit::FirstGap;

#[derive(Debug, Default, Clone)]
pub struct ContinuityTracker {
    prev_last: Option<u64>,
    gaps: u64,
    first_gap: Option<FirstGap>,
}

impl ContinuityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next delta; `line` is its 1-based raw line number. Returns
    /// `false` when it does not continue the previous one.
    pub fn observe(&mut self, first: u64, last: u64, line: u64) -> bool {
        let continuous = match self.prev_last {
            None => true,
            Some(prev) => first <= prev.saturating_add(1) && prev.saturating_add(1) <= last,
        };

        if !continuous {
            self.gaps += 1;
            if self.first_gap.is_none() {
                self.first_gap = Some(FirstGap {
                    prev_last_update_id: self.prev_last.unwrap_or_default(),
                    first_update_id: first,
                    last_update_id: last,
                    line,
                });
            }
        }
        // After a gap the chain restarts from this delta.
        self.prev_last = Some(last);
        continuous
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn is_continuous(&self) -> bool {
        self.gaps == 0
    }

    pub fn first_gap(&self) -> Option<&FirstGap> {
        self.first_gap.as_ref()
    }
}
