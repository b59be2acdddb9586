use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::StoreError;
use crate::performance::TierStats;
use crate::question::{Difficulty, Question, QuestionRecord};

/// A named, user-authored quiz as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub name: String,
    #[serde(default)]
    pub questions: Vec<QuestionRecord>,
}

/// Summary written when a quiz finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResults {
    /// ISO-8601 local time
    pub timestamp: String,
    pub total_questions: usize,
    pub answered_count: usize,
    pub correct_count: usize,
    pub overall_accuracy: f64,
    pub average_time: f64,
    pub questions: Vec<QuestionRecord>,
    #[serde(default)]
    pub difficulty_stats: BTreeMap<Difficulty, TierStats>,
}

pub fn timestamp_now() -> String {
    Local::now().to_rfc3339()
}

/// Converts records to questions, dropping (and logging) the invalid ones.
pub fn questions_from_records(records: Vec<QuestionRecord>) -> Vec<Question> {
    records
        .into_iter()
        .filter_map(|record| {
            let prompt = record.question.clone();
            Question::try_from(record)
                .map_err(|e| warn!(prompt, "skipping invalid question: {e}"))
                .ok()
        })
        .collect()
}

/// Persistence for custom quizzes and the last results record.
///
/// Loads never fail: a missing or unreadable quiz is an empty list.
pub trait QuizStore: Send {
    fn save_quiz(&self, name: &str, questions: &[Question]) -> Result<(), StoreError>;
    fn load_quiz(&self, name: &str) -> Vec<Question>;
    fn list_quizzes(&self) -> Vec<String>;
    fn save_results(&self, results: &QuizResults) -> Result<(), StoreError>;
    fn load_results(&self) -> Option<QuizResults>;
}

/// JSON files under a data directory:
/// `quizzes/<name>.json` and `quiz_results.json`.
#[derive(Debug, Clone)]
pub struct FileQuizStore {
    dir: PathBuf,
}

impl FileQuizStore {
    pub fn new() -> Result<Self, StoreError> {
        AppDirs::data_dir()
            .map(Self::with_dir)
            .ok_or(StoreError::NoDataDir)
    }

    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn quizzes_dir(&self) -> PathBuf {
        self.dir.join("quizzes")
    }

    /// Names must stay inside `quizzes/`: one normal path component.
    fn quiz_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => {
                Ok(self.quizzes_dir().join(format!("{name}.json")))
            }
            _ => Err(StoreError::InvalidName(name.to_string())),
        }
    }

    fn results_path(&self) -> PathBuf {
        self.dir.join("quiz_results.json")
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(value)?;
        fs::write(path, data)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, StoreError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl QuizStore for FileQuizStore {
    fn save_quiz(&self, name: &str, questions: &[Question]) -> Result<(), StoreError> {
        let record = QuizRecord {
            name: name.to_string(),
            questions: questions.iter().map(Question::to_record).collect(),
        };
        Self::write_json(&self.quiz_path(name)?, &record)
    }

    fn load_quiz(&self, name: &str) -> Vec<Question> {
        match self
            .quiz_path(name)
            .and_then(|path| Self::read_json::<QuizRecord>(&path))
        {
            Ok(record) => questions_from_records(record.questions),
            Err(e) => {
                warn!(name, "could not load quiz: {e}");
                Vec::new()
            }
        }
    }

    fn list_quizzes(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.quizzes_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    fn save_results(&self, results: &QuizResults) -> Result<(), StoreError> {
        Self::write_json(&self.results_path(), results)
    }

    fn load_results(&self) -> Option<QuizResults> {
        Self::read_json(&self.results_path()).ok()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    quizzes: HashMap<String, Vec<QuestionRecord>>,
    results: Option<QuizResults>,
}

/// In-memory store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuizStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl QuizStore for MemoryQuizStore {
    fn save_quiz(&self, name: &str, questions: &[Question]) -> Result<(), StoreError> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.quizzes.insert(
                name.to_string(),
                questions.iter().map(Question::to_record).collect(),
            );
        }
        Ok(())
    }

    fn load_quiz(&self, name: &str) -> Vec<Question> {
        let records = self
            .inner
            .lock()
            .ok()
            .and_then(|inner| inner.quizzes.get(name).cloned())
            .unwrap_or_default();
        questions_from_records(records)
    }

    fn list_quizzes(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .lock()
            .map(|inner| inner.quizzes.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn save_results(&self, results: &QuizResults) -> Result<(), StoreError> {
        if let Ok(mut inner) = self.inner.lock() {
            inner.results = Some(results.clone());
        }
        Ok(())
    }

    fn load_results(&self) -> Option<QuizResults> {
        self.inner.lock().ok().and_then(|inner| inner.results.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    fn sample() -> Vec<Question> {
        let mut answered = Question::new(
            "Which data structure follows LIFO principle?",
            vec!["Queue".into(), "Stack".into(), "Tree".into(), "Graph".into()],
            "Stack",
            Difficulty::Easy,
        )
        .unwrap();
        answered.submit("Queue", 14);
        vec![
            answered,
            Question::true_false("Merge sort is O(n log n).", true, Difficulty::Hard),
        ]
    }

    #[test]
    fn save_and_load_quiz_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path());

        store.save_quiz("dsa", &sample()).unwrap();
        assert_eq!(store.load_quiz("dsa"), sample());
        assert_eq!(store.list_quizzes(), vec!["dsa".to_string()]);
    }

    #[test]
    fn missing_quiz_loads_empty() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path());
        assert!(store.load_quiz("nope").is_empty());
        assert!(store.list_quizzes().is_empty());
        assert!(store.load_results().is_none());
    }

    #[test]
    fn corrupt_quiz_loads_empty() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path());
        fs::create_dir_all(dir.path().join("quizzes")).unwrap();
        fs::write(dir.path().join("quizzes").join("bad.json"), b"{ not json").unwrap();

        assert!(store.load_quiz("bad").is_empty());
        assert_eq!(store.list_quizzes(), vec!["bad".to_string()]);
    }

    #[test]
    fn load_skips_invalid_questions_and_defaults_fields() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path());
        fs::create_dir_all(dir.path().join("quizzes")).unwrap();
        let json = r#"{
            "name": "hand-written",
            "questions": [
                {"question": "2 + 2?", "correctAnswer": "4", "difficulty": "easy", "options": ["3", "4"]},
                {"question": "broken", "correctAnswer": "x", "options": ["a", "b"]}
            ]
        }"#;
        fs::write(dir.path().join("quizzes").join("hand-written.json"), json).unwrap();

        let loaded = store.load_quiz("hand-written");
        assert_eq!(loaded.len(), 1);
        assert!(!loaded[0].is_answered());
        assert_eq!(loaded[0].time_spent(), 0);
    }

    #[test]
    fn quiz_names_cannot_leave_the_quizzes_dir() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path().join("data"));
        fs::write(dir.path().join("outside.json"), br#"{"name": "outside"}"#).unwrap();

        for name in ["../escape", "../../x", "a/b", "a\\b", "..", ".", "", "/tmp/abs"] {
            assert_matches!(
                store.save_quiz(name, &sample()),
                Err(StoreError::InvalidName(n)) if n == name
            );
        }
        assert!(!dir.path().join("escape.json").exists());
        assert!(!dir.path().join("data").exists());
        assert!(store.load_quiz("../../outside").is_empty());

        store.save_quiz("my quiz v1.2", &sample()).unwrap();
        assert_eq!(store.load_quiz("my quiz v1.2").len(), 2);
    }

    #[test]
    fn results_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileQuizStore::with_dir(dir.path().join("nested"));
        let results = QuizResults {
            timestamp: timestamp_now(),
            total_questions: 2,
            answered_count: 1,
            correct_count: 0,
            overall_accuracy: 0.0,
            average_time: 14.0,
            questions: sample().iter().map(Question::to_record).collect(),
            difficulty_stats: BTreeMap::new(),
        };

        store.save_results(&results).unwrap();
        assert_eq!(store.load_results(), Some(results));

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join("nested/quiz_results.json")).unwrap())
                .unwrap();
        assert_eq!(raw["totalQuestions"], 2);
        assert_eq!(raw["questions"][0]["userAnswer"], "Queue");
    }

    #[test]
    fn timestamp_is_iso8601() {
        let ts = timestamp_now();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn memory_store_shares_state_between_clones() {
        let store = MemoryQuizStore::default();
        let other = store.clone();
        store.save_quiz("b", &sample()).unwrap();
        store.save_quiz("a", &sample()).unwrap();

        assert_eq!(other.list_quizzes(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(other.load_quiz("a").len(), 2);
    }
}
