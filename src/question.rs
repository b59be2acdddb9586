use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QuestionError;

/// Difficulty tier. The derived ordering (Easy < Medium < Hard) drives transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    strum_macros::Display,
)]
#[serde(into = "String", from = "String")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// One step up, saturating at Hard.
    pub fn harder(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Hard => Difficulty::Hard,
        }
    }

    /// One step down, saturating at Easy.
    pub fn easier(self) -> Self {
        match self {
            Difficulty::Hard => Difficulty::Medium,
            Difficulty::Medium | Difficulty::Easy => Difficulty::Easy,
        }
    }

    /// Starting selection weight for questions of this tier.
    pub fn base_weight(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.5,
            Difficulty::Hard => 2.0,
        }
    }
}

impl FromStr for Difficulty {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised parses as Easy.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Easy,
        })
    }
}

impl From<String> for Difficulty {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Difficulty::Easy)
    }
}

impl From<Difficulty> for String {
    fn from(d: Difficulty) -> Self {
        d.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum QuestionKind {
    #[default]
    MultipleChoice,
    TrueFalse,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple",
            QuestionKind::TrueFalse => "boolean",
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for QuestionKind {
    fn from(s: String) -> Self {
        if s.eq_ignore_ascii_case("boolean") {
            QuestionKind::TrueFalse
        } else {
            QuestionKind::MultipleChoice
        }
    }
}

impl From<QuestionKind> for String {
    fn from(k: QuestionKind) -> Self {
        k.as_str().to_string()
    }
}

/// A quiz question: immutable content plus the per-session answer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    options: Vec<String>,
    correct_answer: String,
    difficulty: Difficulty,
    kind: QuestionKind,
    answered: bool,
    user_answer: String,
    time_spent: u64,
}

impl Question {
    /// Builds a multiple-choice question, checking that the options are
    /// non-empty, unique, and contain the correct answer.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        difficulty: Difficulty,
    ) -> Result<Self, QuestionError> {
        Self::with_kind(
            prompt,
            options,
            correct_answer,
            difficulty,
            QuestionKind::MultipleChoice,
        )
    }

    pub fn with_kind(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
        difficulty: Difficulty,
        kind: QuestionKind,
    ) -> Result<Self, QuestionError> {
        let correct_answer = correct_answer.into();
        validate_options(&options, &correct_answer)?;

        Ok(Self {
            prompt: prompt.into(),
            options,
            correct_answer,
            difficulty,
            kind,
            answered: false,
            user_answer: String::new(),
            time_spent: 0,
        })
    }

    pub fn true_false(prompt: impl Into<String>, correct: bool, difficulty: Difficulty) -> Self {
        Self {
            prompt: prompt.into(),
            options: vec!["True".to_string(), "False".to_string()],
            correct_answer: if correct { "True" } else { "False" }.to_string(),
            difficulty,
            kind: QuestionKind::TrueFalse,
            answered: false,
            user_answer: String::new(),
            time_spent: 0,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    pub fn is_answered(&self) -> bool {
        self.answered
    }

    /// Empty while unanswered.
    pub fn user_answer(&self) -> &str {
        &self.user_answer
    }

    /// Exact, case-sensitive match against the correct answer.
    pub fn is_correct(&self) -> bool {
        self.answered && self.user_answer == self.correct_answer
    }

    /// Seconds spent before the answer was submitted.
    pub fn time_spent(&self) -> u64 {
        self.time_spent
    }

    /// Records a submitted answer and the time it took.
    pub fn submit(&mut self, answer: impl Into<String>, time_spent: u64) {
        self.user_answer = answer.into();
        self.answered = true;
        self.time_spent = time_spent;
    }

    /// Back to unanswered. The recorded time is kept.
    pub fn clear(&mut self) {
        self.user_answer.clear();
        self.answered = false;
    }

    pub fn to_record(&self) -> QuestionRecord {
        QuestionRecord::from(self)
    }
}

fn validate_options(options: &[String], correct_answer: &str) -> Result<(), QuestionError> {
    if options.is_empty() {
        return Err(QuestionError::NoOptions);
    }

    let mut seen = HashSet::with_capacity(options.len());
    for option in options {
        if !seen.insert(option.as_str()) {
            return Err(QuestionError::DuplicateOption(option.clone()));
        }
    }

    if !seen.contains(correct_answer) {
        return Err(QuestionError::CorrectAnswerMissing(correct_answer.to_string()));
    }

    Ok(())
}

/// Persisted shape of a question. Optional answer-state fields default when missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question: String,
    pub correct_answer: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub user_answer: String,
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_difficulty() -> Difficulty {
    Difficulty::Easy
}

impl From<&Question> for QuestionRecord {
    fn from(q: &Question) -> Self {
        Self {
            question: q.prompt.clone(),
            correct_answer: q.correct_answer.clone(),
            difficulty: q.difficulty,
            kind: q.kind,
            answered: q.answered,
            user_answer: q.user_answer.clone(),
            time_spent: q.time_spent,
            options: q.options.clone(),
        }
    }
}

impl TryFrom<QuestionRecord> for Question {
    type Error = QuestionError;

    fn try_from(record: QuestionRecord) -> Result<Self, Self::Error> {
        let mut question = Question::with_kind(
            record.question,
            record.options,
            record.correct_answer,
            record.difficulty,
            record.kind,
        )?;
        question.user_answer = record.user_answer;
        question.answered = record.answered;
        question.time_spent = record.time_spent;
        Ok(question)
    }
}
