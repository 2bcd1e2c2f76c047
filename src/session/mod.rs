//! Interactive Session Engine
//!
//! A session is a cooperative state machine. It never performs I/O itself:
//! [`Session::update`] consumes one [`Message`] (a key press, a tick, or the
//! result of an async unit) and optionally returns the next [`Work`] item for
//! the runtime to perform. At most one unit is in flight at a time because
//! only the idle states (`EnterPrompt`, `ConfirmRun`) ever emit work.
//!
//! # States
//! ```text
//! InitialChecks -> EnterPrompt <-> ShowContext
//! EnterPrompt   -> GenerateCommand | GetAnswer
//! GenerateCommand -> ConfirmRun | Done
//! ConfirmRun    -> RunCommand | EnterPrompt
//! RunCommand    -> Done
//! GetAnswer     -> Done
//! Done          -> EnterPrompt | Terminal
//! ```
//! Ctrl+C reaches `Terminal` from every state and `Terminal` ignores
//! everything, including late results.
//!
//! # Confirmation gate
//! Execution takes a [`ConfirmedCommand`]. Its constructor is private to this
//! module and is only called from the `ConfirmRun` handler after the operator
//! typed "yes", so no other path can produce a command the executor accepts.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::translator::{Mode, Translation};

pub mod runtime;
pub mod ui;

pub use runtime::{drive, perform, run};

/// Where the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    InitialChecks,
    EnterPrompt,
    ShowContext,
    GenerateCommand,
    GetAnswer,
    ConfirmRun,
    RunCommand,
    Done,
    Terminal,
}

impl Step {
    /// An async unit is in flight
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::InitialChecks | Self::GenerateCommand | Self::GetAnswer | Self::RunCommand)
    }
}

/// Result carried by `Done`
#[derive(Debug)]
pub enum Outcome {
    /// Formatted output or a prose answer
    Success(String),
    /// Enter returns to the prompt, nothing is recorded
    Recoverable(ParleyError),
    /// Only quitting is possible
    Fatal(ParleyError),
}

/// One completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub prompt: String,
    pub mode: Mode,
    /// Empty in answer mode
    pub command: String,
    pub output: String,
}

/// A command the operator explicitly approved
#[derive(Debug, PartialEq, Eq)]
pub struct ConfirmedCommand(String);

impl ConfirmedCommand {
    fn approve(command: String) -> Self {
        Self(command)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Inbound events
#[derive(Debug)]
pub enum Message {
    Key(KeyEvent),
    /// Initial checks finished: the context text, or the authentication failure
    Checked(Result<String>),
    /// Translation result, plus the context text when a snapshot now exists
    CommandTranslated(Result<Translation>, Option<String>),
    AnswerTranslated(Result<String>, Option<String>),
    /// Formatted table, or the execution/formatting failure
    Executed(Result<String>),
    Tick,
}

/// Async units the runtime performs on the session's behalf
#[derive(Debug, PartialEq, Eq)]
pub enum Work {
    InitialChecks,
    TranslateCommand(String),
    TranslateAnswer(String),
    Execute(ConfirmedCommand),
}

pub struct Session {
    title: String,
    step: Step,
    mode: Mode,
    history: Vec<HistoryEntry>,
    cursor: usize,
    prompt_input: String,
    confirm_input: String,
    /// Prompt being processed, fixed at submission
    submitted: String,
    pending: Option<Translation>,
    /// Command handed to the executor, recorded with the entry
    ran: String,
    outcome: Option<Outcome>,
    context_view: String,
    started: bool,
    ticks: usize,
}

impl Session {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            step: Step::InitialChecks,
            mode: Mode::default(),
            history: Vec::new(),
            cursor: 0,
            prompt_input: String::new(),
            confirm_input: String::new(),
            submitted: String::new(),
            pending: None,
            ran: String::new(),
            outcome: None,
            context_view: String::new(),
            started: false,
            ticks: 0,
        }
    }

    /// The first unit of work; `None` once the session has started
    pub fn start(&mut self) -> Option<Work> {
        if self.started || self.step != Step::InitialChecks {
            return None;
        }
        self.started = true;
        info!(session = %self.title, "Running initial checks");
        Some(Work::InitialChecks)
    }

    /// Apply one message and return the unit of work it triggers, if any
    pub fn update(&mut self, message: Message) -> Option<Work> {
        if self.step == Step::Terminal {
            return None;
        }

        match message {
            Message::Tick => {
                self.ticks = self.ticks.wrapping_add(1);
                None
            }
            Message::Key(key) if is_interrupt(&key) => {
                self.transition(Step::Terminal);
                None
            }
            Message::Key(key) => self.on_key(key),
            Message::Checked(result) => {
                self.on_checked(result);
                None
            }
            Message::CommandTranslated(result, context) => {
                self.refresh_context(context);
                self.on_command(result);
                None
            }
            Message::AnswerTranslated(result, context) => {
                self.refresh_context(context);
                self.on_result(Step::GetAnswer, result);
                None
            }
            Message::Executed(result) => {
                self.on_result(Step::RunCommand, result);
                None
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Option<Work> {
        match self.step {
            Step::EnterPrompt => self.on_prompt_key(key),
            Step::ShowContext => {
                if matches!(key.code, KeyCode::Tab | KeyCode::Esc) {
                    self.transition(Step::EnterPrompt);
                }
                None
            }
            Step::ConfirmRun => self.on_confirm_key(key),
            Step::Done => {
                self.on_done_key(key);
                None
            }
            // busy states only honor Ctrl+C, handled in update
            _ => None,
        }
    }

    fn on_prompt_key(&mut self, key: KeyEvent) -> Option<Work> {
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc) => self.transition(Step::Terminal),
            (_, KeyCode::Tab) => self.transition(Step::ShowContext),
            (_, KeyCode::Up) => self.recall_previous(),
            (_, KeyCode::Down) => self.recall_next(),
            (_, KeyCode::Left | KeyCode::Right) => self.mode = self.mode.toggled(),
            (_, KeyCode::Backspace) => {
                self.prompt_input.pop();
            }
            (_, KeyCode::Enter) => return self.submit(),
            (modifiers, KeyCode::Char(c)) if !modifiers.contains(KeyModifiers::CONTROL) => {
                self.prompt_input.push(c);
            }
            _ => {}
        }
        None
    }

    fn submit(&mut self) -> Option<Work> {
        let prompt = self.prompt_input.trim();
        if prompt.is_empty() {
            return None;
        }
        self.submitted = prompt.to_string();

        match self.mode {
            Mode::Command => {
                self.transition(Step::GenerateCommand);
                Some(Work::TranslateCommand(self.submitted.clone()))
            }
            Mode::Answer => {
                self.transition(Step::GetAnswer);
                Some(Work::TranslateAnswer(self.submitted.clone()))
            }
        }
    }

    fn on_confirm_key(&mut self, key: KeyEvent) -> Option<Work> {
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc) => self.back_to_prompt(),
            (_, KeyCode::Backspace) => {
                self.confirm_input.pop();
            }
            (_, KeyCode::Enter) => match self.confirm_input.trim() {
                "yes" | "Yes" => {
                    let Some(translation) = self.pending.take() else {
                        warn!("Confirmation without a pending command");
                        self.back_to_prompt();
                        return None;
                    };
                    info!(command = %translation.command, "Command confirmed");
                    self.ran = translation.command.clone();
                    self.confirm_input.clear();
                    self.transition(Step::RunCommand);
                    return Some(Work::Execute(ConfirmedCommand::approve(translation.command)));
                }
                "no" | "No" => {
                    info!("Command declined");
                    self.back_to_prompt();
                }
                _ => self.confirm_input.clear(),
            },
            (modifiers, KeyCode::Char(c)) if !modifiers.contains(KeyModifiers::CONTROL) => {
                self.confirm_input.push(c);
            }
            _ => {}
        }
        None
    }

    fn on_done_key(&mut self, key: KeyEvent) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q')) {
            self.transition(Step::Terminal);
            return;
        }
        if key.code != KeyCode::Enter {
            return;
        }

        match self.outcome.take() {
            Some(Outcome::Success(output)) => {
                let command = match self.mode {
                    Mode::Command => std::mem::take(&mut self.ran),
                    Mode::Answer => String::new(),
                };
                self.history.push(HistoryEntry {
                    prompt: std::mem::take(&mut self.submitted),
                    mode: self.mode,
                    command,
                    output,
                });
                self.back_to_prompt();
            }
            Some(Outcome::Recoverable(_)) => {
                // the prompt stays in the buffer for another attempt
                self.cursor = self.history.len();
                self.confirm_input.clear();
                self.ran.clear();
                self.transition(Step::EnterPrompt);
            }
            fatal @ (Some(Outcome::Fatal(_)) | None) => self.outcome = fatal,
        }
    }

    fn on_checked(&mut self, result: Result<String>) {
        if self.step != Step::InitialChecks {
            return;
        }
        match result {
            Ok(context) => {
                self.context_view = context;
                self.transition(Step::EnterPrompt);
            }
            Err(e) => self.finish(Outcome::Fatal(e)),
        }
    }

    /// The translator may have built the context lazily after a degraded start
    fn refresh_context(&mut self, context: Option<String>) {
        if let Some(context) = context {
            self.context_view = context;
        }
    }

    fn on_command(&mut self, result: Result<Translation>) {
        if self.step != Step::GenerateCommand {
            return;
        }
        match result {
            Ok(translation) => {
                self.pending = Some(translation);
                self.confirm_input.clear();
                self.transition(Step::ConfirmRun);
            }
            Err(e) => self.finish(Outcome::Recoverable(e)),
        }
    }

    fn on_result(&mut self, expected: Step, result: Result<String>) {
        if self.step != expected {
            return;
        }
        match result {
            Ok(output) => self.finish(Outcome::Success(output)),
            Err(e) => self.finish(Outcome::Recoverable(e)),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        match &outcome {
            Outcome::Success(_) => {}
            Outcome::Recoverable(e) => warn!(code = e.error_code(), error = %e, "Step failed"),
            Outcome::Fatal(e) => warn!(code = e.error_code(), error = %e, "Session cannot continue"),
        }
        self.outcome = Some(outcome);
        self.transition(Step::Done);
    }

    fn back_to_prompt(&mut self) {
        self.prompt_input.clear();
        self.confirm_input.clear();
        self.submitted.clear();
        self.pending = None;
        self.ran.clear();
        self.cursor = self.history.len();
        self.transition(Step::EnterPrompt);
    }

    fn recall_previous(&mut self) {
        if self.history.is_empty() {
            return;
        }
        self.cursor = self.cursor.saturating_sub(1);
        self.prompt_input = self.history[self.cursor].prompt.clone();
    }

    fn recall_next(&mut self) {
        if self.cursor < self.history.len() {
            self.cursor += 1;
        }
        self.prompt_input = self
            .history
            .get(self.cursor)
            .map(|entry| entry.prompt.clone())
            .unwrap_or_default();
    }

    fn transition(&mut self, to: Step) {
        if self.step != to {
            info!(from = ?self.step, ?to, "Session step");
            self.step = to;
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub const fn step(&self) -> Step {
        self.step
    }

    pub const fn mode(&self) -> Mode {
        self.mode
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Recall cursor; `history().len()` means a fresh prompt
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn prompt_input(&self) -> &str {
        &self.prompt_input
    }

    pub fn confirm_input(&self) -> &str {
        &self.confirm_input
    }

    /// Prompt currently being processed
    pub fn submitted(&self) -> &str {
        &self.submitted
    }

    /// Command awaiting confirmation
    pub const fn pending(&self) -> Option<&Translation> {
        self.pending.as_ref()
    }

    pub const fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn context_view(&self) -> &str {
        &self.context_view
    }

    pub const fn ticks(&self) -> usize {
        self.ticks
    }

    pub fn is_finished(&self) -> bool {
        self.step == Step::Terminal
    }
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
}
