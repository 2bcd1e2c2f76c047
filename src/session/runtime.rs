//! Session runtime: performs units of work and owns the terminal
//!
//! Every input reaches the session through one unbounded queue. Key presses
//! come from a blocking reader thread, ticks from its poll timeout, and unit
//! results from spawned tasks that post exactly one message each.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::cursor::Show;
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{ui, ConfirmedCommand, Message, Session, Work};
use crate::engine::{unavailable_context, Backend};
use crate::error::Result;

const TICK_RATE: Duration = Duration::from_millis(200);

/// Perform one unit against the backend and wrap the result as a message
pub async fn perform(work: Work, backend: &dyn Backend) -> Message {
    match work {
        Work::InitialChecks => Message::Checked(initial_checks(backend).await),
        Work::TranslateCommand(prompt) => {
            let result = backend.translate_to_command(&prompt).await;
            Message::CommandTranslated(result, backend.built_context().await)
        }
        Work::TranslateAnswer(prompt) => {
            let result = backend.translate_to_answer(&prompt).await;
            Message::AnswerTranslated(result, backend.built_context().await)
        }
        Work::Execute(command) => Message::Executed(run_command(backend, &command).await),
    }
}

/// Authentication is fatal, a missing context is not
async fn initial_checks(backend: &dyn Backend) -> Result<String> {
    backend.check_authentication().await?;

    match backend.build_context().await {
        Ok(()) => Ok(backend.render_context().await),
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "Continuing without backend context");
            Ok(unavailable_context(&e))
        }
    }
}

async fn run_command(backend: &dyn Backend, command: &ConfirmedCommand) -> Result<String> {
    let raw = backend.execute(command).await?;
    backend.format_as_table(&raw)
}

fn dispatch(work: Work, backend: Arc<dyn Backend>, tx: UnboundedSender<Message>) {
    tokio::spawn(async move {
        let message = perform(work, backend.as_ref()).await;
        // a closed queue means the session already ended
        let _ = tx.send(message);
    });
}

/// Feed queued messages to the session until it terminates
///
/// `render` is called after every message that leaves the session running.
pub async fn drive<F>(
    session: &mut Session,
    backend: Arc<dyn Backend>,
    tx: UnboundedSender<Message>,
    mut rx: UnboundedReceiver<Message>,
    mut render: F,
) -> anyhow::Result<()>
where
    F: FnMut(&Session) -> anyhow::Result<()>,
{
    if let Some(work) = session.start() {
        dispatch(work, backend.clone(), tx.clone());
    }
    render(session)?;

    while let Some(message) = rx.recv().await {
        if let Some(work) = session.update(message) {
            dispatch(work, backend.clone(), tx.clone());
        }
        if session.is_finished() {
            break;
        }
        render(session)?;
    }

    info!(entries = session.history().len(), "Session ended");
    Ok(())
}

/// Read key presses on the blocking pool; a poll timeout becomes a tick
fn spawn_key_reader(tx: UnboundedSender<Message>, stop: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while !stop.load(Ordering::Relaxed) {
            let message = match event::poll(TICK_RATE) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => Message::Key(key),
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "Failed to read terminal event");
                        break;
                    }
                },
                Ok(false) => Message::Tick,
                Err(e) => {
                    warn!(error = %e, "Failed to poll terminal events");
                    break;
                }
            };

            if tx.send(message).is_err() {
                break;
            }
        }
    })
}

/// Runs `restore` when dropped unless disarmed first
struct RestoreOnDrop<F: FnOnce()> {
    restore: Option<F>,
}

impl<F: FnOnce()> RestoreOnDrop<F> {
    fn new(restore: F) -> Self {
        Self { restore: Some(restore) }
    }

    fn disarm(mut self) {
        self.restore = None;
    }
}

impl<F: FnOnce()> Drop for RestoreOnDrop<F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// Run a full-screen session against `backend`
pub async fn run(backend: Arc<dyn Backend>, title: String) -> anyhow::Result<()> {
    // ── Terminal setup ──────────────────────────────────────────────

    enable_raw_mode().context("Failed to enable raw mode")?;
    // covers failed setup below and panics in the loop
    let guard = RestoreOnDrop::new(|| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
    });

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let mut terminal =
        Terminal::new(CrosstermBackend::new(stdout)).context("Failed to create terminal")?;

    // ── Main loop ───────────────────────────────────────────────────

    let (tx, rx) = mpsc::unbounded_channel();
    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_key_reader(tx.clone(), stop.clone());

    let mut session = Session::new(title);
    let run_result = drive(&mut session, backend, tx, rx, |session| {
        terminal
            .draw(|frame| ui::draw(frame, session))
            .map(|_| ())
            .context("Failed to draw session")
    })
    .await;

    stop.store(true, Ordering::Relaxed);

    // ── Restore terminal ────────────────────────────────────────────

    guard.disarm();
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    // exits within one poll interval
    let _ = reader.await;

    run_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_restore_runs_when_setup_fails() {
        let restored = Cell::new(0);
        let setup = || -> anyhow::Result<()> {
            let _guard = RestoreOnDrop::new(|| restored.set(restored.get() + 1));
            anyhow::bail!("alternate screen unavailable");
        };

        assert!(setup().is_err());
        assert_eq!(restored.get(), 1);
    }

    #[test]
    fn test_restore_runs_on_panic() {
        let restored = Cell::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = RestoreOnDrop::new(|| restored.set(true));
            panic!("draw failed");
        }));

        assert!(result.is_err());
        assert!(restored.get());
    }

    #[test]
    fn test_disarmed_guard_leaves_terminal_alone() {
        let restored = Cell::new(false);
        RestoreOnDrop::new(|| restored.set(true)).disarm();
        assert!(!restored.get());
    }
}
