use std::collections::{BTreeMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};

use rand::rngs::StdRng;
use rand::RngCore;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::difficulty::DifficultyMachine;
use crate::error::QuizError;
use crate::performance::{PerformanceTracker, TierStats};
use crate::question::{Difficulty, Question};
use crate::selector::{QuestionSelector, SelectionContext};
use crate::store::{timestamp_now, QuizResults, QuizStore};
use crate::util::mean;

/// Everything the session reports to its subscribers, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizEvent {
    Started,
    Paused,
    Resumed,
    Finished,
    QuestionChanged(usize),
    AnswerSubmitted { index: usize, correct: bool },
    TimeUpdated(i64),
    DifficultyChanged(Difficulty),
    ProgressUpdated { answered: usize, total: usize },
    StreakUpdated { correct: u32, wrong: u32 },
}

/// Identifies one outstanding question fetch. Only the latest ticket can
/// start the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket(u64);

/// Mutable per-quiz state, discarded wholesale on reset.
#[derive(Debug, Clone)]
struct SessionState {
    questions: Vec<Question>,
    current_index: usize,
    remaining_secs: i64,
    is_active: bool,
    is_paused: bool,
    history: Vec<usize>,
    answered: HashSet<usize>,
    /// indices whose latest submitted answer was correct
    correct: HashSet<usize>,
    recorded_times: Vec<Option<u64>>,
    difficulty: DifficultyMachine,
    tracker: PerformanceTracker,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            questions: Vec::new(),
            current_index: 0,
            remaining_secs: 0,
            is_active: false,
            is_paused: false,
            history: Vec::new(),
            answered: HashSet::new(),
            correct: HashSet::new(),
            recorded_times: Vec::new(),
            difficulty: DifficultyMachine::new(),
            tracker: PerformanceTracker::new(),
        }
    }
}

fn selection_context(state: &SessionState) -> SelectionContext<'_> {
    SelectionContext {
        questions: &state.questions,
        answered: &state.answered,
        tracker: &state.tracker,
        current_difficulty: state.difficulty.current(),
        consecutive_correct: state.difficulty.consecutive_correct(),
        consecutive_wrong: state.difficulty.consecutive_wrong(),
    }
}

/// Drives one quiz: lifecycle, countdown, navigation and answer bookkeeping.
///
/// All transitions are synchronous. Guarded operations return `false` (or
/// `Err` for [`QuizSession::start`]) and change nothing when their
/// precondition does not hold.
pub struct QuizSession<R: RngCore = StdRng> {
    state: SessionState,
    initial_duration: i64,
    selector: QuestionSelector<R>,
    store: Box<dyn QuizStore>,
    subscribers: Vec<Sender<QuizEvent>>,
    fetch_generation: u64,
    pending_fetch: Option<FetchTicket>,
}

impl QuizSession<StdRng> {
    /// Selector seeded from `config.seed`, or from entropy when unset.
    pub fn new(config: &Config, store: Box<dyn QuizStore>) -> Self {
        let selector = match config.seed {
            Some(seed) => QuestionSelector::seeded(seed),
            None => QuestionSelector::from_entropy(),
        };
        Self::with_selector(config, store, selector)
    }
}

impl<R: RngCore> QuizSession<R> {
    pub fn with_selector(
        config: &Config,
        store: Box<dyn QuizStore>,
        selector: QuestionSelector<R>,
    ) -> Self {
        let initial_duration = i64::try_from(config.initial_duration_secs).unwrap_or(i64::MAX);
        Self {
            state: SessionState {
                remaining_secs: initial_duration,
                ..SessionState::default()
            },
            initial_duration,
            selector,
            store,
            subscribers: Vec::new(),
            fetch_generation: 0,
            pending_fetch: None,
        }
    }

    /// Registers a subscriber. Every later event is delivered to it.
    pub fn subscribe(&mut self) -> Receiver<QuizEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: QuizEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn emit_progress(&mut self) {
        let event = QuizEvent::ProgressUpdated {
            answered: self.answered_count(),
            total: self.total_questions(),
        };
        self.emit(event);
    }

    // ----- lifecycle -----

    /// Starts a quiz over `questions`. Fails only if a quiz is already running.
    pub fn start(&mut self, questions: Vec<Question>) -> Result<(), QuizError> {
        if self.state.is_active {
            return Err(QuizError::InvalidState);
        }

        self.reset();
        let total = questions.len();
        self.state.recorded_times = vec![None; total];
        self.state.questions = questions;
        self.selector.initialize(&self.state.questions);
        self.state.is_active = true;
        self.state.remaining_secs = self.initial_duration;
        self.pending_fetch = None;

        info!(total, duration = self.initial_duration, "quiz started");
        self.emit(QuizEvent::Started);
        self.emit(QuizEvent::QuestionChanged(0));
        self.emit(QuizEvent::ProgressUpdated { answered: 0, total });
        Ok(())
    }

    /// Drops all per-quiz state and leaves the session inactive.
    pub fn reset(&mut self) {
        self.state = SessionState {
            remaining_secs: self.initial_duration,
            ..SessionState::default()
        };
        self.selector.reset();
    }

    pub fn pause(&mut self) -> bool {
        if !self.state.is_active || self.state.is_paused {
            return false;
        }
        self.state.is_paused = true;
        self.emit(QuizEvent::Paused);
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.state.is_active || !self.state.is_paused {
            return false;
        }
        self.state.is_paused = false;
        self.emit(QuizEvent::Resumed);
        true
    }

    /// Ends the quiz, persists the results record and emits `Finished`.
    pub fn finish(&mut self) -> bool {
        if !self.state.is_active {
            return false;
        }
        self.state.is_active = false;
        self.state.is_paused = false;

        let results = self.results();
        info!(
            answered = results.answered_count,
            correct = results.correct_count,
            accuracy = results.overall_accuracy,
            "quiz finished"
        );
        if let Err(e) = self.store.save_results(&results) {
            warn!("could not save quiz results: {e}");
        }

        self.emit(QuizEvent::Finished);
        true
    }

    /// One-second countdown step. Finishes the quiz when time runs out.
    pub fn tick(&mut self) -> bool {
        if !self.state.is_active || self.state.is_paused {
            return false;
        }
        self.state.remaining_secs -= 1;
        self.emit(QuizEvent::TimeUpdated(self.state.remaining_secs));

        if self.state.remaining_secs <= 0 {
            self.finish();
        }
        true
    }

    // ----- fetch gating -----

    /// Issues a ticket for a question fetch. Any earlier ticket becomes stale.
    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.fetch_generation += 1;
        let ticket = FetchTicket(self.fetch_generation);
        self.pending_fetch = Some(ticket);
        ticket
    }

    /// Starts the quiz with fetched (or fallback) questions, unless the
    /// ticket is stale or a quiz is already running.
    pub fn complete_fetch(&mut self, ticket: FetchTicket, questions: Vec<Question>) -> bool {
        if self.pending_fetch != Some(ticket) || self.state.is_active {
            debug!(?ticket, "ignoring late or superseded fetch result");
            return false;
        }
        self.start(questions).is_ok()
    }

    // ----- custom quizzes -----

    /// Loads a saved quiz by name and starts it. Nothing starts if the quiz is
    /// missing, empty or unreadable.
    pub fn load_custom(&mut self, name: &str) -> bool {
        let questions = self.store.load_quiz(name);
        if questions.is_empty() {
            warn!(name, "custom quiz has no questions");
            return false;
        }
        self.start(questions).is_ok()
    }

    pub fn create_custom(&self, name: &str, questions: &[Question]) -> bool {
        match self.store.save_quiz(name, questions) {
            Ok(()) => true,
            Err(e) => {
                warn!(name, "could not save custom quiz: {e}");
                false
            }
        }
    }

    // ----- answering -----

    /// Records `text` as the answer to the current question.
    pub fn answer(&mut self, text: &str) -> bool {
        let index = self.state.current_index;
        if !self.state.is_active || index >= self.state.questions.len() {
            return false;
        }

        let elapsed = (self.initial_duration - self.state.remaining_secs).max(0) as u64;
        let question = &mut self.state.questions[index];
        question.submit(text, elapsed);
        let correct = question.is_correct();
        let difficulty = question.difficulty();

        self.state.answered.insert(index);
        if correct {
            self.state.correct.insert(index);
        } else {
            self.state.correct.remove(&index);
        }
        self.state.recorded_times[index] = Some(elapsed);

        self.state
            .tracker
            .record_answer(difficulty, correct, elapsed as f64);
        if let Some(next) = self.state.difficulty.record(correct) {
            info!(difficulty = %next, "difficulty changed");
            self.emit(QuizEvent::DifficultyChanged(next));
        }
        self.selector
            .update_weights(&selection_context(&self.state));

        self.emit(QuizEvent::AnswerSubmitted { index, correct });
        self.emit_progress();
        self.emit(QuizEvent::StreakUpdated {
            correct: self.state.difficulty.consecutive_correct(),
            wrong: self.state.difficulty.consecutive_wrong(),
        });
        true
    }

    /// Marks the current question unanswered again. Streaks, tracker stats,
    /// selector weights and the answered/correct counts keep whatever the
    /// earlier `answer` did to them.
    pub fn clear_answer(&mut self) -> bool {
        let index = self.state.current_index;
        if !self.state.is_active || index >= self.state.questions.len() {
            return false;
        }
        self.state.questions[index].clear();
        true
    }

    // ----- navigation -----

    pub fn next(&mut self) -> bool {
        let target = self.state.current_index + 1;
        if !self.state.is_active || target >= self.state.questions.len() {
            debug!(index = self.state.current_index, "next rejected");
            return false;
        }
        self.move_to(target);
        true
    }

    pub fn previous(&mut self) -> bool {
        if !self.state.is_active {
            return false;
        }
        let Some(index) = self.state.history.pop() else {
            debug!("previous rejected, history is empty");
            return false;
        };
        self.state.current_index = index;
        self.emit(QuizEvent::QuestionChanged(index));
        self.emit_progress();
        true
    }

    pub fn go_to(&mut self, index: usize) -> bool {
        self.try_go_to(index).is_ok()
    }

    pub fn try_go_to(&mut self, index: usize) -> Result<(), QuizError> {
        if !self.state.is_active {
            return Err(QuizError::InvalidState);
        }
        let total = self.state.questions.len();
        if index >= total {
            debug!(index, total, "go_to rejected");
            return Err(QuizError::OutOfRange { index, total });
        }
        self.move_to(index);
        Ok(())
    }

    fn move_to(&mut self, index: usize) {
        self.state.history.push(self.state.current_index);
        self.state.current_index = index;
        self.emit(QuizEvent::QuestionChanged(index));
        self.emit_progress();
    }

    /// Lets the selector choose where to go next. `false` when inactive or
    /// when every question is answered.
    pub fn select_next(&mut self) -> bool {
        if !self.state.is_active {
            return false;
        }
        let picked = self.selector.select(&selection_context(&self.state));

        match picked {
            Some(index) => {
                self.state.history.push(self.state.current_index);
                self.state.current_index = index;
                self.emit(QuizEvent::QuestionChanged(index));
                true
            }
            None => false,
        }
    }

    // ----- accessors -----

    pub fn is_active(&self) -> bool {
        self.state.is_active
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index
    }

    pub fn total_questions(&self) -> usize {
        self.state.questions.len()
    }

    pub fn answered_count(&self) -> usize {
        self.state.answered.len()
    }

    pub fn correct_count(&self) -> usize {
        self.state.correct.len()
    }

    pub fn remaining_time(&self) -> i64 {
        self.state.remaining_secs
    }

    pub fn current_question(&self) -> Option<Question> {
        self.state.questions.get(self.state.current_index).cloned()
    }

    pub fn questions(&self) -> &[Question] {
        &self.state.questions
    }

    pub fn is_answered(&self, index: usize) -> bool {
        self.state.answered.contains(&index)
    }

    pub fn current_difficulty(&self) -> Difficulty {
        self.state.difficulty.current()
    }

    pub fn consecutive_correct(&self) -> u32 {
        self.state.difficulty.consecutive_correct()
    }

    pub fn consecutive_wrong(&self) -> u32 {
        self.state.difficulty.consecutive_wrong()
    }

    pub fn difficulty_stats(&self) -> BTreeMap<Difficulty, TierStats> {
        self.state.tracker.snapshot()
    }

    pub fn selector(&self) -> &QuestionSelector<R> {
        &self.selector
    }

    /// Percentage of answered questions that were answered correctly.
    pub fn overall_accuracy(&self) -> f64 {
        let answered = self.answered_count();
        if answered == 0 {
            return 0.0;
        }
        self.correct_count() as f64 / answered as f64 * 100.0
    }

    /// Recorded seconds per answered question, in question order.
    pub fn time_per_question(&self) -> Vec<u64> {
        self.state.recorded_times.iter().flatten().copied().collect()
    }

    pub fn average_time_per_question(&self) -> f64 {
        let times: Vec<f64> = self
            .time_per_question()
            .into_iter()
            .map(|t| t as f64)
            .collect();
        mean(&times).unwrap_or(0.0)
    }

    pub fn results(&self) -> QuizResults {
        QuizResults {
            timestamp: timestamp_now(),
            total_questions: self.total_questions(),
            answered_count: self.answered_count(),
            correct_count: self.correct_count(),
            overall_accuracy: self.overall_accuracy(),
            average_time: self.average_time_per_question(),
            questions: self.state.questions.iter().map(Question::to_record).collect(),
            difficulty_stats: self.difficulty_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryQuizStore;
    use assert_matches::assert_matches;

    fn q(prompt: &str, difficulty: Difficulty) -> Question {
        Question::new(prompt, vec!["yes".into(), "no".into()], "yes", difficulty).unwrap()
    }

    fn three_easy() -> Vec<Question> {
        (0..3).map(|i| q(&format!("e{i}"), Difficulty::Easy)).collect()
    }

    fn session() -> QuizSession {
        let config = Config {
            initial_duration_secs: 60,
            seed: Some(17),
            ..Config::default()
        };
        QuizSession::new(&config, Box::new(MemoryQuizStore::default()))
    }

    fn drain(rx: &Receiver<QuizEvent>) -> Vec<QuizEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_start_emits_initial_sequence() {
        let mut s = session();
        let rx = s.subscribe();
        s.start(three_easy()).unwrap();

        assert_eq!(
            drain(&rx),
            vec![
                QuizEvent::Started,
                QuizEvent::QuestionChanged(0),
                QuizEvent::ProgressUpdated {
                    answered: 0,
                    total: 3
                },
            ]
        );
        assert!(s.is_active());
        assert_eq!(s.remaining_time(), 60);
        assert_eq!(s.current_index(), 0);
    }

    #[test]
    fn test_start_while_active_is_invalid_state() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        assert_matches!(s.start(three_easy()), Err(QuizError::InvalidState));
    }

    #[test]
    fn test_three_correct_moves_to_medium_once() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        let rx = s.subscribe();

        for i in 0..3 {
            s.go_to(i);
            assert!(s.answer("yes"));
        }

        let changes: Vec<_> = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, QuizEvent::DifficultyChanged(_)))
            .collect();
        assert_eq!(changes, vec![QuizEvent::DifficultyChanged(Difficulty::Medium)]);
        assert_eq!(s.current_difficulty(), Difficulty::Medium);
        assert_eq!(s.consecutive_correct(), 0);

        s.answer("yes");
        assert_eq!(s.consecutive_correct(), 1);
    }

    #[test]
    fn test_answer_event_order() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        let rx = s.subscribe();

        s.answer("no");
        assert_eq!(
            drain(&rx),
            vec![
                QuizEvent::AnswerSubmitted {
                    index: 0,
                    correct: false
                },
                QuizEvent::ProgressUpdated {
                    answered: 1,
                    total: 3
                },
                QuizEvent::StreakUpdated {
                    correct: 0,
                    wrong: 1
                },
            ]
        );
    }

    #[test]
    fn test_counts_follow_latest_answers() {
        let mut s = session();
        s.start(three_easy()).unwrap();

        s.answer("yes");
        s.answer("no"); // re-answer index 0
        s.next();
        s.answer("yes");

        assert_eq!(s.answered_count(), 2);
        assert_eq!(s.correct_count(), 1);
        assert_eq!(s.overall_accuracy(), 50.0);
    }

    #[test]
    fn test_answer_records_elapsed_time() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        for _ in 0..7 {
            s.tick();
        }
        s.answer("yes");

        assert_eq!(s.current_question().unwrap().time_spent(), 7);
        assert_eq!(s.time_per_question(), vec![7]);
        assert_eq!(s.average_time_per_question(), 7.0);
    }

    #[test]
    fn test_clear_answer_keeps_counters() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        s.answer("yes");
        assert!(s.clear_answer());

        let current = s.current_question().unwrap();
        assert!(!current.is_answered());
        assert_eq!(current.user_answer(), "");
        assert_eq!(s.answered_count(), 1);
        assert_eq!(s.correct_count(), 1);
        assert_eq!(s.consecutive_correct(), 1);
    }

    #[test]
    fn test_inactive_operations_are_noops() {
        let mut s = session();
        assert!(!s.answer("yes"));
        assert!(!s.clear_answer());
        assert!(!s.next());
        assert!(!s.previous());
        assert!(!s.go_to(0));
        assert!(!s.pause());
        assert!(!s.resume());
        assert!(!s.finish());
        assert!(!s.tick());
        assert!(!s.select_next());
        assert_eq!(s.answered_count(), 0);
        assert_eq!(s.overall_accuracy(), 0.0);
    }

    #[test]
    fn test_navigation_bounds_and_history() {
        let mut s = session();
        s.start(three_easy()).unwrap();

        assert!(!s.previous(), "empty history");
        assert!(s.next());
        assert!(s.next());
        assert!(!s.next(), "already at the last question");
        assert_eq!(s.current_index(), 2);

        assert!(s.go_to(0));
        assert_matches!(
            s.try_go_to(3),
            Err(QuizError::OutOfRange { index: 3, total: 3 })
        );

        assert!(s.previous());
        assert_eq!(s.current_index(), 2);
        assert!(s.previous());
        assert_eq!(s.current_index(), 1);
        assert!(s.previous());
        assert_eq!(s.current_index(), 0);
        assert!(!s.previous());
    }

    #[test]
    fn test_pause_and_resume_gate_ticks() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        let rx = s.subscribe();

        assert!(s.pause());
        assert!(!s.pause());
        assert!(!s.tick());
        assert_eq!(s.remaining_time(), 60);
        assert!(s.resume());
        assert!(!s.resume());
        assert!(s.tick());
        assert_eq!(s.remaining_time(), 59);

        assert_eq!(
            drain(&rx),
            vec![
                QuizEvent::Paused,
                QuizEvent::Resumed,
                QuizEvent::TimeUpdated(59)
            ]
        );
    }

    #[test]
    fn test_countdown_finishes_exactly_once() {
        let config = Config {
            initial_duration_secs: 2,
            seed: Some(1),
            ..Config::default()
        };
        let store = MemoryQuizStore::default();
        let mut s = QuizSession::new(&config, Box::new(store.clone()));
        s.start(three_easy()).unwrap();
        let rx = s.subscribe();

        s.tick();
        assert!(s.is_active());
        s.tick();
        assert!(!s.is_active());
        assert!(!s.tick());

        let finished = drain(&rx)
            .into_iter()
            .filter(|e| *e == QuizEvent::Finished)
            .count();
        assert_eq!(finished, 1);
        assert!(store.load_results().is_some());
    }

    #[test]
    fn test_select_next_targets_current_tier_early_on() {
        let tiers = [
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Hard,
            Difficulty::Easy,
            Difficulty::Medium,
            Difficulty::Hard,
            Difficulty::Easy,
            Difficulty::Medium,
        ];
        let mut s = session();
        s.start(tiers.iter().enumerate().map(|(i, d)| q(&format!("q{i}"), *d)).collect())
            .unwrap();

        s.answer("yes");
        assert!(s.select_next());
        assert_eq!(s.current_index(), 2);
        s.answer("yes");
        assert!(s.select_next());
        assert_eq!(s.current_index(), 5);
        s.answer("yes");
        assert_eq!(s.current_difficulty(), Difficulty::Medium);

        // weighted phase: any unanswered question
        assert!(s.select_next());
        assert!(!s.is_answered(s.current_index()));

        assert!(s.previous());
        assert_eq!(s.current_index(), 5);
    }

    #[test]
    fn test_select_next_is_noop_when_everything_is_answered() {
        let mut s = session();
        s.start(vec![q("only", Difficulty::Hard)]).unwrap();
        s.answer("no");
        let rx = s.subscribe();

        assert!(!s.select_next());
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_stale_fetch_ticket_is_ignored() {
        let mut s = session();
        let first = s.begin_fetch();
        let second = s.begin_fetch();

        assert!(!s.complete_fetch(first, three_easy()));
        assert!(!s.is_active());
        assert!(s.complete_fetch(second, three_easy()));
        assert!(s.is_active());
        // late duplicate after the session started
        assert!(!s.complete_fetch(second, three_easy()));
    }

    #[test]
    fn test_custom_quiz_round_trip() {
        let store = MemoryQuizStore::default();
        let mut s = QuizSession::new(&Config::default(), Box::new(store));

        assert!(!s.load_custom("missing"));
        assert!(s.create_custom("mine", &three_easy()));
        assert!(s.load_custom("mine"));
        assert_eq!(s.total_questions(), 3);
    }

    #[test]
    fn test_reset_discards_state() {
        let mut s = session();
        s.start(three_easy()).unwrap();
        s.answer("yes");
        s.reset();

        assert!(!s.is_active());
        assert_eq!(s.total_questions(), 0);
        assert_eq!(s.answered_count(), 0);
        assert_eq!(s.current_difficulty(), Difficulty::Easy);
        assert!(s.selector().pool().is_none());
    }
}
