// Library surface for the CLI and for headless/integration tests.
pub mod app_dirs;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod performance;
pub mod question;
pub mod runtime;
pub mod selector;
pub mod session;
pub mod source;
pub mod store;
pub mod util;

pub use error::{QuestionError, QuizError, SourceError, StoreError};
pub use question::{Difficulty, Question, QuestionKind};
pub use session::{QuizEvent, QuizSession};
