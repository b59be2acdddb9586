use std::error::Error;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use quizwise::config::{Config, ConfigOverrides, ConfigStore, FileConfigStore};
use quizwise::runtime::{FixedTicker, InputEvent, LineCommandSource, Runner};
use quizwise::source::{
    fetch_with_fallback, LocalBank, QuestionSource, QuizType, TriviaFileSource,
};
use quizwise::store::{FileQuizStore, QuizResults, QuizStore};
use quizwise::{QuizEvent, QuizSession};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// adaptive quiz in the terminal
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "An adaptive quiz that raises or lowers question difficulty from your answer streaks and picks the next question from how you are doing."
)]
pub struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// take a quiz (the default)
    Play(PlayArgs),
    /// list saved custom quizzes
    List(DataDirArgs),
    /// show the last quiz results
    Results(DataDirArgs),
    /// list built-in question banks
    Banks,
}

#[derive(Args, Debug, Default)]
struct DataDirArgs {
    /// directory holding custom quizzes and results
    #[clap(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct PlayArgs {
    /// general, cpp_dsa, current_affairs or custom:<name>
    #[clap(short = 't', long)]
    quiz_type: Option<QuizType>,

    /// number of questions to request
    #[clap(short = 'n', long)]
    count: Option<usize>,

    /// quiz length in seconds
    #[clap(short = 'd', long)]
    duration: Option<u64>,

    /// fix the question selection order
    #[clap(long)]
    seed: Option<u64>,

    /// read general questions from an open-trivia JSON file
    #[clap(long)]
    trivia_file: Option<PathBuf>,

    /// remember these options as the new defaults
    #[clap(long)]
    save: bool,

    #[clap(flatten)]
    data: DataDirArgs,
}

impl PlayArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            initial_duration_secs: self.duration,
            question_count: self.count,
            quiz_type: self.quiz_type.as_ref().map(QuizType::to_string),
            seed: self.seed,
        }
    }
}

fn open_store(args: &DataDirArgs) -> Result<FileQuizStore, Box<dyn Error>> {
    Ok(match &args.data_dir {
        Some(dir) => FileQuizStore::with_dir(dir),
        None => FileQuizStore::new()?,
    })
}

const DEFAULT_LOG_FILTER: &str = "quizwise=info";

/// `RUST_LOG` when it is set and parses, otherwise `quizwise=info`.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn main() -> Result<(), Box<dyn Error>> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Play(PlayArgs::default())) {
        Commands::Play(args) => play(args),
        Commands::List(args) => {
            let names = open_store(&args)?.list_quizzes();
            if names.is_empty() {
                println!("no custom quizzes saved");
            }
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Results(args) => {
            match open_store(&args)?.load_results() {
                Some(results) => print_results(&results),
                None => println!("no results yet"),
            }
            Ok(())
        }
        Commands::Banks => {
            for (tag, count) in LocalBank::catalog() {
                println!("{tag:<16} {count:>3} questions");
            }
            Ok(())
        }
    }
}

fn play(args: PlayArgs) -> Result<(), Box<dyn Error>> {
    let config_store = FileConfigStore::new();
    let config: Config = config_store.load().with_overrides(args.overrides());
    if args.save {
        config_store.save(&config)?;
    }

    let quiz_type = config.quiz_type.parse::<QuizType>().unwrap_or_else(|e| {
        warn!("{e}, using general");
        QuizType::General
    });
    let store = open_store(&args.data)?;

    let mut session = QuizSession::new(&config, Box::new(store));
    let events = session.subscribe();

    let started = match (&quiz_type, quiz_type.request(config.question_count)) {
        (QuizType::Custom(name), _) => session.load_custom(name),
        (_, Some(request)) => {
            let ticket = session.begin_fetch();
            let source: Arc<dyn QuestionSource> = match &args.trivia_file {
                Some(path) => Arc::new(TriviaFileSource::new(path)),
                None => Arc::new(LocalBank::new()),
            };
            let questions = fetch_with_fallback(
                source,
                request,
                Duration::from_secs(config.fetch_timeout_secs),
                quiz_type.fallback_bank(),
            );
            session.complete_fetch(ticket, questions)
        }
        (_, None) => false,
    };
    if !started {
        println!("no questions available for {quiz_type}");
        return Ok(());
    }

    println!("answer with an option number or its text; n/p next/previous, g <i> jump, s pick for me, c clear, pause/resume, q quit");
    render(&events, &session);

    let runner = Runner::new(LineCommandSource::stdin(), FixedTicker::every_second());
    runner.drive(&mut session, |event, session| {
        if let InputEvent::Closed = event {
            println!("input closed");
        }
        render(&events, session);
    });

    print_results(&session.results());
    Ok(())
}

/// Prints whatever the session reported since the last call.
fn render(events: &Receiver<QuizEvent>, session: &QuizSession) {
    for event in events.try_iter() {
        match event {
            QuizEvent::QuestionChanged(index) => print_question(session, index),
            QuizEvent::AnswerSubmitted { correct, .. } => {
                println!("{}", if correct { "correct" } else { "wrong" });
            }
            QuizEvent::DifficultyChanged(d) => println!("difficulty is now {d}"),
            QuizEvent::TimeUpdated(secs) if secs > 0 && secs % 60 == 0 => {
                println!("{} min left", secs / 60);
            }
            QuizEvent::Paused => println!("paused"),
            QuizEvent::Resumed => println!("resumed"),
            QuizEvent::Finished => println!("quiz finished"),
            _ => {}
        }
    }
}

fn print_question(session: &QuizSession, index: usize) {
    let Some(question) = session.questions().get(index) else {
        return;
    };
    println!(
        "\n[{}/{}] ({}) {}",
        index + 1,
        session.total_questions(),
        question.difficulty(),
        question.prompt()
    );
    for (i, option) in question.options().iter().enumerate() {
        println!("  {}) {option}", i + 1);
    }
    if question.is_answered() {
        println!("  answered: {}", question.user_answer());
    }
}

fn print_results(results: &QuizResults) {
    println!("\n{}", results.timestamp);
    println!(
        "answered {}/{}, correct {} ({:.0}%), {:.1}s per question",
        results.answered_count,
        results.total_questions,
        results.correct_count,
        results.overall_accuracy,
        results.average_time
    );
    for (difficulty, stats) in &results.difficulty_stats {
        if stats.attempts > 0 {
            println!(
                "  {difficulty}: {}/{} correct",
                stats.correct, stats.attempts
            );
        }
    }
}
