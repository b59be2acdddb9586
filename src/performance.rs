use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::question::Difficulty;

/// Smoothing factor for the per-tier time average.
pub const TIME_SMOOTHING: f64 = 0.3;

/// Accuracy reported for a tier before it has any attempts.
pub const DEFAULT_ACCURACY: f64 = 0.5;

/// Average time (seconds) assumed for a tier before it has any attempts.
pub fn default_average_time(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy => 60.0,
        Difficulty::Medium => 90.0,
        Difficulty::Hard => 120.0,
    }
}

/// Rolling statistics for one difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub attempts: u32,
    pub correct: u32,
    /// correct / attempts, or the neutral default before the first attempt
    pub accuracy: f64,
    /// exponentially smoothed seconds per answer
    pub average_time: f64,
}

impl TierStats {
    fn seeded(difficulty: Difficulty) -> Self {
        Self {
            attempts: 0,
            correct: 0,
            accuracy: DEFAULT_ACCURACY,
            average_time: default_average_time(difficulty),
        }
    }

    /// Plain correct/attempts ratio, 0 when nothing was attempted.
    pub fn ratio(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.correct as f64 / self.attempts as f64
        }
    }
}

/// Per-difficulty accuracy and timing, fed by every answered question.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceTracker {
    tiers: BTreeMap<Difficulty, TierStats>,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceTracker {
    pub fn new() -> Self {
        let tiers = Difficulty::ALL
            .iter()
            .map(|&d| (d, TierStats::seeded(d)))
            .collect();
        Self { tiers }
    }

    pub fn record_answer(&mut self, difficulty: Difficulty, correct: bool, time_spent_secs: f64) {
        let stats = self
            .tiers
            .entry(difficulty)
            .or_insert_with(|| TierStats::seeded(difficulty));

        stats.attempts += 1;
        if correct {
            stats.correct += 1;
        }
        stats.accuracy = stats.correct as f64 / stats.attempts as f64;
        stats.average_time =
            TIME_SMOOTHING * time_spent_secs + (1.0 - TIME_SMOOTHING) * stats.average_time;
    }

    pub fn accuracy(&self, difficulty: Difficulty) -> f64 {
        self.tiers
            .get(&difficulty)
            .map_or(DEFAULT_ACCURACY, |s| s.accuracy)
    }

    pub fn average_time(&self, difficulty: Difficulty) -> f64 {
        self.tiers
            .get(&difficulty)
            .map_or_else(|| default_average_time(difficulty), |s| s.average_time)
    }

    pub fn stats(&self, difficulty: Difficulty) -> TierStats {
        self.tiers
            .get(&difficulty)
            .copied()
            .unwrap_or_else(|| TierStats::seeded(difficulty))
    }

    /// Snapshot of every tier, Easy first.
    pub fn snapshot(&self) -> BTreeMap<Difficulty, TierStats> {
        self.tiers.clone()
    }
}
