use serde::{Deserialize, Serialize};

/// Metropolis acceptance rule.
///
/// Energy-lowering (or neutral) moves are always accepted and `draw` is not
/// called. Otherwise one uniform value in `[0, 1)` is drawn and the move is
/// accepted iff `exp(-beta * delta_e) >= draw`.
pub fn metropolis_accept<F>(delta_e: f64, beta: f64, draw: F) -> bool
where
    F: FnOnce() -> f64,
{
    if delta_e <= 0.0 {
        return true;
    }
    (-beta * delta_e).exp() >= draw()
}

/// Running acceptance counters for trial moves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStatistics {
    /// Number of trial moves attempted
    pub attempts: u64,
    /// Number of trial moves accepted
    pub accepted: u64,
}

impl MoveStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, accepted: bool) {
        self.attempts += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    pub fn rejected(&self) -> u64 {
        self.attempts - self.accepted
    }

    /// Fraction of accepted moves, 0 when nothing was attempted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempts as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
