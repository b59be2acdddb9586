use std::cell::Cell;
use std::fmt;
use std::io::BufRead;
use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use rand::RngCore;
use tracing::debug;

use crate::session::QuizSession;

/// A user command, one per input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// 1-based option number on the current question.
    Choose(usize),
    /// Free-text answer, matched exactly against the correct answer.
    Answer(String),
    Next,
    Previous,
    /// 0-based question index.
    GoTo(usize),
    /// Let the selector pick the next question.
    Select,
    Pause,
    Resume,
    Clear,
    Quit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCommandError(String);

impl fmt::Display for ParseCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised command: {:?}", self.0)
    }
}

impl std::error::Error for ParseCommandError {}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let err = || ParseCommandError(line.to_string());
        match line {
            "" => Err(err()),
            "n" => Ok(Command::Next),
            "p" => Ok(Command::Previous),
            "s" => Ok(Command::Select),
            "c" => Ok(Command::Clear),
            "q" => Ok(Command::Quit),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            _ => {
                if let Some(arg) = line.strip_prefix("g ") {
                    // shown to users 1-based
                    return match arg.trim().parse::<usize>() {
                        Ok(n) if n > 0 => Ok(Command::GoTo(n - 1)),
                        _ => Err(err()),
                    };
                }
                match line.parse::<usize>() {
                    Ok(0) => Err(err()),
                    Ok(n) => Ok(Command::Choose(n)),
                    Err(_) => Ok(Command::Answer(line.to_string())),
                }
            }
        }
    }
}

/// Unified event type consumed by the app runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Command(Command),
    Tick,
    /// The input stream ended.
    Closed,
}

/// Source of user commands
pub trait CommandSource: Send + 'static {
    /// Block for up to `timeout` waiting for a command.
    fn recv_timeout(&self, timeout: Duration) -> Result<Command, RecvTimeoutError>;
}

/// Reads commands line by line from any buffered reader on a background thread.
pub struct LineCommandSource {
    rx: Receiver<Command>,
}

impl LineCommandSource {
    pub fn new<B: BufRead + Send + 'static>(reader: B) -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for line in reader.lines() {
                let Ok(line) = line else { break };
                match line.parse::<Command>() {
                    Ok(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => debug!("{e}"),
                }
            }
        });

        Self { rx }
    }

    pub fn stdin() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()))
    }
}

impl CommandSource for LineCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<Command, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The countdown's one-second cadence.
    pub fn every_second() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test command source fed from a channel
pub struct TestCommandSource {
    rx: Receiver<Command>,
}

impl TestCommandSource {
    pub fn new(rx: Receiver<Command>) -> Self {
        Self { rx }
    }
}

impl CommandSource for TestCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<Command, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Applies one command to the session. Returns whether anything changed.
pub fn apply_command<R: RngCore>(session: &mut QuizSession<R>, command: &Command) -> bool {
    match command {
        Command::Choose(n) => {
            let option = session
                .current_question()
                .and_then(|q| n.checked_sub(1).and_then(|i| q.options().get(i).cloned()));
            match option {
                Some(text) => session.answer(&text),
                None => {
                    debug!(choice = n, "no such option");
                    false
                }
            }
        }
        Command::Answer(text) => session.answer(text),
        Command::Next => session.next(),
        Command::Previous => session.previous(),
        Command::GoTo(index) => session.go_to(*index),
        Command::Select => session.select_next(),
        Command::Pause => session.pause(),
        Command::Resume => session.resume(),
        Command::Clear => session.clear_answer(),
        Command::Quit => session.finish(),
    }
}

/// Runner that advances the application one event/tick at a time
///
/// Ticks follow a wall-clock deadline, so a steady stream of commands
/// cannot hold the countdown back.
pub struct Runner<E: CommandSource, T: Ticker> {
    command_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: CommandSource, T: Ticker> Runner<E, T> {
    pub fn new(command_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            command_source,
            ticker,
            next_tick,
        }
    }

    /// Returns Tick once the tick deadline has passed, otherwise blocks
    /// until the deadline for the next command.
    pub fn step(&self) -> InputEvent {
        let deadline = self.next_tick.get();
        let now = Instant::now();
        if now >= deadline {
            return self.fire_tick(deadline);
        }
        match self
            .command_source
            .recv_timeout(deadline.saturating_duration_since(now))
        {
            Ok(command) => InputEvent::Command(command),
            Err(RecvTimeoutError::Timeout) => self.fire_tick(deadline),
            Err(RecvTimeoutError::Disconnected) => InputEvent::Closed,
        }
    }

    // Overdue ticks are delivered one per step until the deadline catches up.
    fn fire_tick(&self, deadline: Instant) -> InputEvent {
        self.next_tick.set(deadline + self.ticker.interval());
        InputEvent::Tick
    }

    /// Feeds events into `session` until it is no longer active. Closed
    /// input finishes the quiz. `observe` sees every event after it was
    /// applied.
    pub fn drive<R, F>(&self, session: &mut QuizSession<R>, mut observe: F)
    where
        R: RngCore,
        F: FnMut(&InputEvent, &QuizSession<R>),
    {
        while session.is_active() {
            let event = self.step();
            match &event {
                InputEvent::Command(command) => {
                    apply_command(session, command);
                }
                InputEvent::Tick => {
                    session.tick();
                }
                InputEvent::Closed => {
                    session.finish();
                }
            }
            observe(&event, session);
        }
    }
}
