use std::collections::{BTreeMap, HashSet};

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

use crate::performance::PerformanceTracker;
use crate::question::{Difficulty, Question};

/// Progress fraction below which the difficulty-targeted strategy is used.
pub const EARLY_PHASE_END: f64 = 0.30;
/// Progress fraction at which the performance-based strategy takes over.
pub const LATE_PHASE_START: f64 = 0.70;

/// Correct streak that raises the targeted tier.
pub const TARGET_RAISE_STREAK: u32 = 3;
/// Wrong streak that lowers the targeted tier. Looser than the state machine's.
pub const TARGET_LOWER_STREAK: u32 = 2;

/// Static per-tier preference used by the time-based strategy.
pub fn difficulty_weight(difficulty: Difficulty) -> f64 {
    match difficulty {
        Difficulty::Easy | Difficulty::Medium => 0.4,
        Difficulty::Hard => 0.2,
    }
}

/// Read-only view of the session that strategies decide from.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub questions: &'a [Question],
    pub answered: &'a HashSet<usize>,
    pub tracker: &'a PerformanceTracker,
    pub current_difficulty: Difficulty,
    pub consecutive_correct: u32,
    pub consecutive_wrong: u32,
}

impl SelectionContext<'_> {
    /// answered / total, 0 for an empty quiz
    pub fn progress(&self) -> f64 {
        if self.questions.is_empty() {
            0.0
        } else {
            self.answered.len() as f64 / self.questions.len() as f64
        }
    }

    pub fn is_unanswered(&self, index: usize) -> bool {
        !self.answered.contains(&index)
    }

    pub fn unanswered(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.questions.len()).filter(move |i| self.is_unanswered(*i))
    }
}

/// Weight table and difficulty partition the strategies work over.
#[derive(Debug, Clone, Default)]
pub struct QuestionPool {
    weights: Vec<f64>,
    by_difficulty: BTreeMap<Difficulty, Vec<usize>>,
}

impl QuestionPool {
    pub fn build(questions: &[Question]) -> Self {
        let weights = questions
            .iter()
            .map(|q| q.difficulty().base_weight())
            .collect();
        let by_difficulty = questions
            .iter()
            .enumerate()
            .into_group_map_by(|(_, q)| q.difficulty())
            .into_iter()
            .map(|(d, items)| (d, items.into_iter().map(|(i, _)| i).collect()))
            .collect();

        Self {
            weights,
            by_difficulty,
        }
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight(&self, index: usize) -> Option<f64> {
        self.weights.get(index).copied()
    }

    pub fn set_weight(&mut self, index: usize, weight: f64) {
        if let Some(w) = self.weights.get_mut(index) {
            *w = weight.max(0.0);
        }
    }

    /// Question indices of one tier in original list order.
    pub fn tier(&self, difficulty: Difficulty) -> &[usize] {
        self.by_difficulty
            .get(&difficulty)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn first_unanswered_in(&self, difficulty: Difficulty, ctx: &SelectionContext<'_>) -> Option<usize> {
        self.tier(difficulty)
            .iter()
            .copied()
            .find(|&i| ctx.is_unanswered(i))
    }

    /// Penalise or reward every unanswered question by its tier's accuracy and
    /// pace. Weights are adjusted in place and never renormalised.
    pub fn update_weights(&mut self, ctx: &SelectionContext<'_>) {
        for (index, question) in ctx.questions.iter().enumerate() {
            if !ctx.is_unanswered(index) {
                continue;
            }
            let Some(weight) = self.weights.get_mut(index) else {
                continue;
            };
            let difficulty = question.difficulty();
            let accuracy = ctx.tracker.accuracy(difficulty);
            let avg_time = ctx.tracker.average_time(difficulty);

            if accuracy < 0.3 {
                *weight *= 0.8;
            } else if accuracy > 0.7 {
                *weight *= 1.2;
            }
            if avg_time > 120.0 {
                *weight *= 0.9;
            }
        }
    }

    /// Linear-scan weighted draw over the unanswered questions.
    pub fn weighted_draw(
        &self,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let available: Vec<(usize, f64)> = ctx
            .unanswered()
            .map(|i| (i, self.weight(i).unwrap_or(0.0)))
            .collect();
        let (first, _) = *available.first()?;

        let total: f64 = available.iter().map(|(_, w)| w).sum();
        if !(total > 0.0 && total.is_finite()) {
            return Some(first);
        }

        let draw = rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for &(index, weight) in &available {
            cumulative += weight;
            if cumulative >= draw {
                return Some(index);
            }
        }
        available.last().map(|(i, _)| *i)
    }
}

/// A way of picking the next question.
pub trait SelectionStrategy {
    fn select(
        &self,
        pool: &mut QuestionPool,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<usize>;
}

/// Draw proportionally to the current weights, after revising them.
pub struct WeightedRandom;

impl SelectionStrategy for WeightedRandom {
    fn select(
        &self,
        pool: &mut QuestionPool,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        pool.update_weights(ctx);
        pool.weighted_draw(ctx, rng)
    }
}

/// First unanswered question of a tier derived from the current streaks.
pub struct DifficultyTargeted;

impl DifficultyTargeted {
    pub fn target(ctx: &SelectionContext<'_>) -> Difficulty {
        if ctx.consecutive_correct >= TARGET_RAISE_STREAK {
            ctx.current_difficulty.harder()
        } else if ctx.consecutive_wrong >= TARGET_LOWER_STREAK {
            ctx.current_difficulty.easier()
        } else {
            ctx.current_difficulty
        }
    }
}

impl SelectionStrategy for DifficultyTargeted {
    fn select(
        &self,
        pool: &mut QuestionPool,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let target = Self::target(ctx);
        if let Some(index) = pool.first_unanswered_in(target, ctx) {
            return Some(index);
        }
        // Global fallback: the target tier is not considered here.
        debug!(%target, "target tier exhausted, falling back to weighted draw");
        WeightedRandom.select(pool, ctx, rng)
    }
}

/// First unanswered question of the tier the user is performing best in.
pub struct PerformanceBased;

impl PerformanceBased {
    pub fn score(tracker: &PerformanceTracker, difficulty: Difficulty) -> f64 {
        let accuracy = tracker.accuracy(difficulty);
        let time_score = 1.0 / (1.0 + tracker.average_time(difficulty) / 60.0);
        0.7 * accuracy + 0.3 * time_score
    }

    /// Highest scoring tier; earlier tiers win ties.
    pub fn best_tier(tracker: &PerformanceTracker) -> Difficulty {
        let mut best = Difficulty::Easy;
        let mut best_score = Self::score(tracker, best);
        for d in Difficulty::ALL {
            let score = Self::score(tracker, d);
            if score > best_score {
                best = d;
                best_score = score;
            }
        }
        best
    }
}

impl SelectionStrategy for PerformanceBased {
    fn select(
        &self,
        pool: &mut QuestionPool,
        ctx: &SelectionContext<'_>,
        rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let best = Self::best_tier(ctx.tracker);
        pool.first_unanswered_in(best, ctx)
            .or_else(|| WeightedRandom.select(pool, ctx, rng))
    }
}

/// Prefer questions from tiers that are quick to answer, scaled by the
/// static tier preference. Ties go to the lowest index.
pub struct TimeBased;

impl TimeBased {
    pub fn priority(tracker: &PerformanceTracker, difficulty: Difficulty) -> f64 {
        let time_priority = 1.0 / (1.0 + tracker.average_time(difficulty) / 60.0);
        time_priority * difficulty_weight(difficulty)
    }
}

impl SelectionStrategy for TimeBased {
    fn select(
        &self,
        _pool: &mut QuestionPool,
        ctx: &SelectionContext<'_>,
        _rng: &mut dyn RngCore,
    ) -> Option<usize> {
        let candidates: Vec<(usize, f64)> = ctx
            .unanswered()
            .map(|i| (i, Self::priority(ctx.tracker, ctx.questions[i].difficulty())))
            .collect();

        candidates
            .into_iter()
            .rev()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StrategyKind {
    DifficultyTargeted,
    WeightedRandom,
    PerformanceBased,
    TimeBased,
}

impl StrategyKind {
    /// Strategy used at a given progress fraction.
    pub fn for_progress(progress: f64) -> Self {
        if progress < EARLY_PHASE_END {
            StrategyKind::DifficultyTargeted
        } else if progress < LATE_PHASE_START {
            StrategyKind::WeightedRandom
        } else {
            StrategyKind::PerformanceBased
        }
    }

    fn strategy(self) -> &'static dyn SelectionStrategy {
        match self {
            StrategyKind::DifficultyTargeted => &DifficultyTargeted,
            StrategyKind::WeightedRandom => &WeightedRandom,
            StrategyKind::PerformanceBased => &PerformanceBased,
            StrategyKind::TimeBased => &TimeBased,
        }
    }
}

/// Chooses the next question index, switching strategy with quiz progress.
///
/// The random source is injected so that selection can be replayed.
pub struct QuestionSelector<R: RngCore = StdRng> {
    pool: Option<QuestionPool>,
    rng: R,
}

impl QuestionSelector<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl<R: RngCore> QuestionSelector<R> {
    pub fn new(rng: R) -> Self {
        Self { pool: None, rng }
    }

    /// Rebuilds the partition and base weights for a new question list.
    pub fn initialize(&mut self, questions: &[Question]) {
        self.pool = Some(QuestionPool::build(questions));
    }

    pub fn reset(&mut self) {
        self.pool = None;
    }

    fn pool_for(&mut self, questions: &[Question]) -> &mut QuestionPool {
        let stale = self
            .pool
            .as_ref()
            .map_or(true, |pool| pool.len() != questions.len());
        if stale {
            self.pool = Some(QuestionPool::build(questions));
        }
        self.pool.get_or_insert_with(|| QuestionPool::build(questions))
    }

    pub fn pool(&self) -> Option<&QuestionPool> {
        self.pool.as_ref()
    }

    pub fn weight(&self, index: usize) -> Option<f64> {
        self.pool.as_ref().and_then(|p| p.weight(index))
    }

    pub fn set_weight(&mut self, questions: &[Question], index: usize, weight: f64) {
        self.pool_for(questions).set_weight(index, weight);
    }

    pub fn update_weights(&mut self, ctx: &SelectionContext<'_>) {
        self.pool_for(ctx.questions).update_weights(ctx);
    }

    /// Picks the next question by progress phase. `None` when everything is answered.
    pub fn select(&mut self, ctx: &SelectionContext<'_>) -> Option<usize> {
        self.select_with(StrategyKind::for_progress(ctx.progress()), ctx)
    }

    pub fn select_with(&mut self, kind: StrategyKind, ctx: &SelectionContext<'_>) -> Option<usize> {
        if ctx.unanswered().next().is_none() {
            return None;
        }
        self.pool_for(ctx.questions);
        let Self { pool, rng } = self;
        let pool = pool.as_mut()?;
        let picked = kind.strategy().select(pool, ctx, rng);
        debug!(strategy = %kind, ?picked, progress = ctx.progress(), "selected next question");
        picked
    }
}
