use crate::question::Difficulty;

/// Consecutive same-outcome answers needed to move one tier.
pub const STREAK_THRESHOLD: u32 = 3;

/// Streak-driven target difficulty.
///
/// Owns the consecutive-correct and consecutive-wrong run lengths. After every
/// answer a correct streak of [`STREAK_THRESHOLD`] steps the tier up; only if
/// that did not fire is the wrong streak checked to step it down. The streak
/// that fired is consumed (reset to 0) even when the tier is already at its
/// bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifficultyMachine {
    current: Difficulty,
    consecutive_correct: u32,
    consecutive_wrong: u32,
}

impl Default for DifficultyMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DifficultyMachine {
    pub fn new() -> Self {
        Self {
            current: Difficulty::Easy,
            consecutive_correct: 0,
            consecutive_wrong: 0,
        }
    }

    pub fn current(&self) -> Difficulty {
        self.current
    }

    pub fn consecutive_correct(&self) -> u32 {
        self.consecutive_correct
    }

    pub fn consecutive_wrong(&self) -> u32 {
        self.consecutive_wrong
    }

    /// Feeds one answer outcome. Returns the new tier when it changed.
    pub fn record(&mut self, correct: bool) -> Option<Difficulty> {
        if correct {
            self.consecutive_correct += 1;
            self.consecutive_wrong = 0;
        } else {
            self.consecutive_wrong += 1;
            self.consecutive_correct = 0;
        }
        self.evaluate()
    }

    fn evaluate(&mut self) -> Option<Difficulty> {
        let next = if self.consecutive_correct >= STREAK_THRESHOLD {
            self.consecutive_correct = 0;
            self.current.harder()
        } else if self.consecutive_wrong >= STREAK_THRESHOLD {
            self.consecutive_wrong = 0;
            self.current.easier()
        } else {
            return None;
        };

        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_easy_with_no_streaks() {
        let m = DifficultyMachine::new();
        assert_eq!(m.current(), Difficulty::Easy);
        assert_eq!(m.consecutive_correct(), 0);
        assert_eq!(m.consecutive_wrong(), 0);
    }

    #[test]
    fn test_three_correct_steps_up_and_resets() {
        let mut m = DifficultyMachine::new();
        assert_eq!(m.record(true), None);
        assert_eq!(m.record(true), None);
        assert_eq!(m.record(true), Some(Difficulty::Medium));
        assert_eq!(m.consecutive_correct(), 0);

        assert_eq!(m.record(true), None);
        assert_eq!(m.consecutive_correct(), 1);
    }

    #[test]
    fn test_three_wrong_steps_down() {
        let mut m = DifficultyMachine::new();
        for _ in 0..6 {
            m.record(true);
        }
        assert_eq!(m.current(), Difficulty::Hard);

        m.record(false);
        m.record(false);
        assert_eq!(m.current(), Difficulty::Hard);
        assert_eq!(m.record(false), Some(Difficulty::Medium));
        assert_eq!(m.consecutive_wrong(), 0);
    }

    #[test]
    fn test_opposite_outcome_resets_streak() {
        let mut m = DifficultyMachine::new();
        m.record(true);
        m.record(true);
        m.record(false);
        assert_eq!(m.consecutive_correct(), 0);
        assert_eq!(m.consecutive_wrong(), 1);
        m.record(true);
        m.record(true);
        assert_eq!(m.current(), Difficulty::Easy);
    }

    #[test]
    fn test_bounds_consume_streak_without_change() {
        let mut m = DifficultyMachine::new();
        for _ in 0..3 {
            m.record(false);
        }
        assert_eq!(m.current(), Difficulty::Easy);
        assert_eq!(m.consecutive_wrong(), 0);

        for _ in 0..6 {
            m.record(true);
        }
        assert_eq!(m.current(), Difficulty::Hard);
        for _ in 0..2 {
            assert_eq!(m.record(true), None);
        }
        assert_eq!(m.record(true), None);
        assert_eq!(m.current(), Difficulty::Hard);
        assert_eq!(m.consecutive_correct(), 0);
    }

    #[test]
    fn test_never_moves_below_threshold() {
        let mut m = DifficultyMachine::new();
        let outcomes = [true, true, false, true, true, false, false, true, false, false];
        for outcome in outcomes {
            assert_eq!(m.record(outcome), None);
        }
        assert_eq!(m.current(), Difficulty::Easy);
    }
}
