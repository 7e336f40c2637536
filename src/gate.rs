use std::time::{Duration, Instant};

/// Pause between a submission resolving and scanning resuming. Gives the
/// operator time to read the result and physically separates repeated scans
/// of a code left in front of the camera.
pub const COOLDOWN: Duration = Duration::from_millis(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Submitting,
    Cooling { until: Instant },
}

/// Duplicate-submission lock.
///
/// A capture loop reports the same physical code many times per second while
/// it stays in frame; the gate guarantees at most one in-flight submission
/// per `Idle -> Submitting` transition. Decode events arriving while the
/// gate is not idle are dropped, never queued. Release back to `Idle` is
/// unconditional once the cooldown elapses, whatever the outcome was.
#[derive(Debug)]
pub struct SubmissionGate {
    phase: Phase,
}

impl SubmissionGate {
    pub fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// Claims the gate for one submission. Returns false (caller must drop
    /// the decode event) when a submission is already in flight or cooling.
    pub fn try_begin(&mut self) -> bool {
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Submitting;
                true
            }
            _ => false,
        }
    }

    /// Marks the in-flight submission as resolved (success, failure or
    /// validation abort) and starts the cooldown window.
    pub fn settle(&mut self, now: Instant) {
        if self.phase == Phase::Submitting {
            self.phase = Phase::Cooling {
                until: now + COOLDOWN,
            };
        }
    }

    /// Advances the cooldown. Returns true exactly once, when the gate
    /// transitions back to `Idle` and capture may resume.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Cooling { until } if now >= until => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }
}

impl Default for SubmissionGate {
    fn default() -> Self {
        Self::new()
    }
}
