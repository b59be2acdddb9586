//! Where question lists come from.
//!
//! A [`QuestionSource`] may be slow or fail outright, so callers go through
//! [`fetch_with_fallback`], which bounds the wait and substitutes one of the
//! built-in banks compiled into the binary.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use include_dir::{include_dir, Dir};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::question::{Difficulty, Question, QuestionKind};
use crate::store::{questions_from_records, QuizRecord};

static BANK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/banks");

pub const GENERAL_BANK: &str = "general";
pub const CPP_DSA_BANK: &str = "cpp_dsa";
pub const CURRENT_AFFAIRS_BANK: &str = "current_affairs";

/// Supplies initial question lists.
pub trait QuestionSource: Send + Sync {
    /// General questions, at most `count` of them.
    fn fetch_default(&self, count: usize) -> Result<Vec<Question>, SourceError>;

    /// The domain-specific (programming) set.
    fn fetch_custom(&self) -> Result<Vec<Question>, SourceError>;

    /// A built-in bank by tag. Unknown tags give an empty list.
    fn local_bank(&self, tag: &str) -> Vec<Question> {
        LocalBank::bank(tag)
    }
}

/// What to ask a source for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Default(usize),
    Custom,
    Bank(String),
}

/// The quiz flavours a user can pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizType {
    General,
    CppDsa,
    CurrentAffairs,
    /// A user-authored quiz, loaded from the store by name.
    Custom(String),
}

impl QuizType {
    /// The source request for this type, `None` for store-backed quizzes.
    pub fn request(&self, count: usize) -> Option<FetchRequest> {
        match self {
            QuizType::General => Some(FetchRequest::Default(count)),
            QuizType::CppDsa => Some(FetchRequest::Custom),
            QuizType::CurrentAffairs => Some(FetchRequest::Bank(CURRENT_AFFAIRS_BANK.to_string())),
            QuizType::Custom(_) => None,
        }
    }

    /// Built-in bank used when the source fails.
    pub fn fallback_bank(&self) -> &'static str {
        match self {
            QuizType::General | QuizType::Custom(_) => GENERAL_BANK,
            QuizType::CppDsa => CPP_DSA_BANK,
            QuizType::CurrentAffairs => CURRENT_AFFAIRS_BANK,
        }
    }
}

impl FromStr for QuizType {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("custom:") {
            if name.is_empty() {
                return Err(SourceError::UnknownQuizType(s.to_string()));
            }
            return Ok(QuizType::Custom(name.to_string()));
        }
        match s.to_lowercase().as_str() {
            "general" | "default" => Ok(QuizType::General),
            "cpp_dsa" | "programming" => Ok(QuizType::CppDsa),
            "current_affairs" => Ok(QuizType::CurrentAffairs),
            _ => Err(SourceError::UnknownQuizType(s.to_string())),
        }
    }
}

impl fmt::Display for QuizType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizType::General => f.write_str(GENERAL_BANK),
            QuizType::CppDsa => f.write_str(CPP_DSA_BANK),
            QuizType::CurrentAffairs => f.write_str(CURRENT_AFFAIRS_BANK),
            QuizType::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Question banks compiled into the binary.
pub struct LocalBank {
    rng: Mutex<StdRng>,
}

impl Default for LocalBank {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBank {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Every question in the bank `tag`, in file order.
    pub fn bank(tag: &str) -> Vec<Question> {
        let Some(file) = BANK_DIR.get_file(format!("{tag}.json")) else {
            debug!(tag, "no built-in bank");
            return Vec::new();
        };
        let Some(contents) = file.contents_utf8() else {
            warn!(tag, "built-in bank is not utf-8");
            return Vec::new();
        };
        match serde_json::from_str::<QuizRecord>(contents) {
            Ok(record) => questions_from_records(record.questions),
            Err(e) => {
                warn!(tag, "built-in bank is malformed: {e}");
                Vec::new()
            }
        }
    }

    /// Bank tags with their question counts, sorted by tag.
    pub fn catalog() -> BTreeMap<String, usize> {
        BANK_DIR
            .files()
            .filter_map(|file| {
                let path = file.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
                } else {
                    None
                }
            })
            .map(|tag| {
                let count = Self::bank(&tag).len();
                (tag, count)
            })
            .collect()
    }

    /// Up to `count` questions from `tag` in shuffled order.
    pub fn sample(&self, tag: &str, count: usize) -> Vec<Question> {
        let mut questions = Self::bank(tag);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        questions.shuffle(&mut *rng);
        questions.truncate(count);
        questions
    }
}

impl QuestionSource for LocalBank {
    fn fetch_default(&self, count: usize) -> Result<Vec<Question>, SourceError> {
        Ok(self.sample(CURRENT_AFFAIRS_BANK, count))
    }

    fn fetch_custom(&self) -> Result<Vec<Question>, SourceError> {
        Ok(Self::bank(CPP_DSA_BANK))
    }
}

#[derive(Debug, Deserialize)]
struct TriviaResponse {
    response_code: i64,
    #[serde(default)]
    results: Vec<TriviaItem>,
}

#[derive(Debug, Deserialize)]
struct TriviaItem {
    question: String,
    correct_answer: String,
    #[serde(default)]
    incorrect_answers: Vec<String>,
    #[serde(default)]
    difficulty: String,
    #[serde(rename = "type", default)]
    kind: String,
}

/// Parses an open-trivia style payload.
///
/// Options are the correct answer followed by the incorrect ones, shuffled
/// with `rng`. Items that do not form a valid question are skipped.
pub fn parse_trivia_response(
    json: &str,
    rng: &mut dyn RngCore,
) -> Result<Vec<Question>, SourceError> {
    let response: TriviaResponse = serde_json::from_str(json)?;
    if response.response_code != 0 {
        debug!(code = response.response_code, "trivia response refused");
        return Err(SourceError::Empty);
    }

    let questions: Vec<Question> = response
        .results
        .into_iter()
        .filter_map(|item| {
            let mut options = Vec::with_capacity(item.incorrect_answers.len() + 1);
            options.push(item.correct_answer.clone());
            options.extend(item.incorrect_answers);
            options.shuffle(&mut *rng);

            Question::with_kind(
                item.question,
                options,
                item.correct_answer,
                Difficulty::from(item.difficulty),
                QuestionKind::from(item.kind),
            )
            .map_err(|e| warn!("skipping trivia item: {e}"))
            .ok()
        })
        .collect();

    if questions.is_empty() {
        return Err(SourceError::Empty);
    }
    Ok(questions)
}

/// Reads a trivia payload from disk on every fetch.
pub struct TriviaFileSource {
    path: PathBuf,
    rng: Mutex<StdRng>,
}

impl TriviaFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed<P: AsRef<Path>>(path: P, seed: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl QuestionSource for TriviaFileSource {
    fn fetch_default(&self, count: usize) -> Result<Vec<Question>, SourceError> {
        let json = fs::read_to_string(&self.path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", self.path.display())))?;
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let mut questions = parse_trivia_response(&json, &mut *rng)?;
        questions.truncate(count);
        Ok(questions)
    }

    fn fetch_custom(&self) -> Result<Vec<Question>, SourceError> {
        Err(SourceError::Unavailable(
            "trivia feeds carry no programming set".to_string(),
        ))
    }
}

/// Runs `request` against `source` on a worker thread and waits at most
/// `timeout`. Errors, timeouts and empty lists all yield the bank
/// `fallback_bank` instead. A result that arrives late is discarded.
pub fn fetch_with_fallback(
    source: Arc<dyn QuestionSource>,
    request: FetchRequest,
    timeout: Duration,
    fallback_bank: &str,
) -> Vec<Question> {
    let (tx, rx) = mpsc::channel();
    let worker_source = Arc::clone(&source);
    let worker_request = request.clone();
    thread::spawn(move || {
        let result = match worker_request {
            FetchRequest::Default(count) => worker_source.fetch_default(count),
            FetchRequest::Custom => worker_source.fetch_custom(),
            FetchRequest::Bank(tag) => Ok(worker_source.local_bank(&tag)),
        };
        // the receiver is gone once the caller stopped waiting
        let _ = tx.send(result);
    });

    let error = match rx.recv_timeout(timeout) {
        Ok(Ok(questions)) if !questions.is_empty() => return questions,
        Ok(Ok(_)) => SourceError::Empty,
        Ok(Err(e)) => e,
        Err(RecvTimeoutError::Timeout) => SourceError::Timeout(timeout),
        Err(RecvTimeoutError::Disconnected) => {
            SourceError::Unavailable("fetch worker exited".to_string())
        }
    };

    warn!(?request, fallback = fallback_bank, "using built-in questions: {error}");
    source.local_bank(fallback_bank)
}
