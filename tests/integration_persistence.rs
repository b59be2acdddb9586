use std::fs;

use quizwise::config::Config;
use quizwise::store::{FileQuizStore, QuizStore};
use quizwise::{Difficulty, Question, QuizSession};

fn questions() -> Vec<Question> {
    vec![
        Question::new(
            "What is the time complexity of binary search?",
            vec![
                "O(1)".into(),
                "O(n)".into(),
                "O(log n)".into(),
                "O(n²)".into(),
            ],
            "O(log n)",
            Difficulty::Medium,
        )
        .unwrap(),
        Question::true_false("A stack is FIFO.", false, Difficulty::Easy),
    ]
}

#[test]
fn custom_quiz_round_trip_through_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        seed: Some(4),
        ..Config::default()
    };

    let mut session = QuizSession::new(&config, Box::new(FileQuizStore::with_dir(dir.path())));
    assert!(session.create_custom("algorithms", &questions()));
    assert!(dir.path().join("quizzes").join("algorithms.json").exists());

    assert!(session.load_custom("algorithms"));
    assert!(session.is_active());
    assert_eq!(session.questions(), questions().as_slice());

    assert!(session.answer("O(log n)"));
    assert!(session.next());
    assert!(session.answer("True"));
    assert!(session.finish());

    // a fresh store over the same directory sees what the session wrote
    let store = FileQuizStore::with_dir(dir.path());
    assert_eq!(store.list_quizzes(), vec!["algorithms".to_string()]);
    let results = store.load_results().unwrap();
    assert_eq!(results.answered_count, 2);
    assert_eq!(results.correct_count, 1);
    assert_eq!(results.overall_accuracy, 50.0);
    assert_eq!(results.questions[1].user_answer, "True");
    assert_eq!(results.difficulty_stats[&Difficulty::Medium].correct, 1);
}

#[test]
fn missing_custom_quiz_does_not_start() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = QuizSession::new(
        &Config::default(),
        Box::new(FileQuizStore::with_dir(dir.path())),
    );

    assert!(!session.load_custom("nothing-here"));
    assert!(!session.is_active());
}

#[test]
fn unwritable_results_do_not_stop_finish() {
    let dir = tempfile::tempdir().unwrap();
    // a file where the data directory should be makes every write fail
    let blocked = dir.path().join("blocked");
    fs::write(&blocked, b"").unwrap();

    let mut session = QuizSession::new(&Config::default(), Box::new(FileQuizStore::with_dir(&blocked)));
    session.start(questions()).unwrap();
    assert!(!session.create_custom("x", &questions()));
    assert!(session.finish());
    assert!(!session.is_active());
}
