//! Session flows driven end to end against scripted backends
//!
//! Units of work are performed inline with `perform`, so every flow is
//! deterministic and the exact sequence of backend calls can be asserted.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use pretty_assertions::assert_eq;

use parley::config::BackendKind;
use parley::engine::Backend;
use parley::session::{perform, HistoryEntry, Message, Outcome, Session, Step};
use parley::translator::{Mode, Translation};
use parley::{ConfirmedCommand, ParleyError, Result};

/// Backend whose every answer is fixed up front; records the calls it gets
struct ScriptedBackend {
    auth: std::result::Result<(), &'static str>,
    context: std::result::Result<&'static str, &'static str>,
    /// Snapshot that becomes available once a translation has run
    late_context: Option<&'static str>,
    command: std::result::Result<&'static str, &'static str>,
    answer: &'static str,
    execution: std::result::Result<&'static str, &'static str>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            auth: Ok(()),
            context: Ok("Database schema (SQLite):\nTable main.users: id (INTEGER)"),
            late_context: None,
            command: Ok("SELECT count(*) FROM users"),
            answer: "There is one table, users.",
            execution: Ok(r#"[{"count(*)":3}]"#),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedBackend {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn translated(&self) -> bool {
        self.calls().iter().any(|c| c.starts_with("translate_"))
    }

    fn executions(&self) -> Vec<String> {
        self.calls().into_iter().filter(|c| c.starts_with("execute:")).collect()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    fn command_label(&self) -> &'static str {
        "SQL query"
    }

    async fn check_authentication(&self) -> Result<()> {
        self.record("check_authentication");
        self.auth.map_err(ParleyError::auth)
    }

    async fn build_context(&self) -> Result<()> {
        self.record("build_context");
        self.context.map(|_| ()).map_err(ParleyError::context)
    }

    async fn render_context(&self) -> String {
        self.record("render_context");
        self.context.unwrap_or("unavailable").to_string()
    }

    async fn built_context(&self) -> Option<String> {
        match self.context {
            Ok(context) => Some(context.to_string()),
            Err(_) if self.translated() => self.late_context.map(str::to_string),
            Err(_) => None,
        }
    }

    async fn translate_to_command(&self, prompt: &str) -> Result<Translation> {
        self.record(format!("translate_to_command:{prompt}"));
        self.command
            .map(|command| Translation {
                command: command.to_string(),
                suggestions: vec!["Show the newest users".to_string()],
            })
            .map_err(ParleyError::translation)
    }

    async fn translate_to_answer(&self, prompt: &str) -> Result<String> {
        self.record(format!("translate_to_answer:{prompt}"));
        Ok(self.answer.to_string())
    }

    async fn execute(&self, command: &ConfirmedCommand) -> Result<Vec<u8>> {
        self.record(format!("execute:{}", command.as_str()));
        self.execution.map(|out| out.as_bytes().to_vec()).map_err(ParleyError::execution)
    }

    fn format_as_table(&self, raw: &[u8]) -> Result<String> {
        parley::format::json_table(raw)
    }
}

fn key(code: KeyCode) -> Message {
    Message::Key(KeyEvent::new(code, KeyModifiers::NONE))
}

/// Apply a message and perform whatever work follows, until the session idles
async fn pump(session: &mut Session, backend: &dyn Backend, message: Message) {
    let mut next = session.update(message);
    while let Some(work) = next {
        let reply = perform(work, backend).await;
        next = session.update(reply);
    }
}

async fn start(backend: &dyn Backend) -> Session {
    let mut session = Session::new("scripted");
    let work = session.start().expect("fresh session starts");
    let reply = perform(work, backend).await;
    pump(&mut session, backend, reply).await;
    session
}

async fn type_line(session: &mut Session, backend: &dyn Backend, text: &str) {
    for c in text.chars() {
        pump(session, backend, key(KeyCode::Char(c))).await;
    }
    pump(session, backend, key(KeyCode::Enter)).await;
}

#[tokio::test]
async fn test_initial_checks_auth_then_context() {
    let backend = ScriptedBackend::default();
    let session = start(&backend).await;

    assert_eq!(session.step(), Step::EnterPrompt);
    assert_eq!(backend.calls(), vec!["check_authentication", "build_context", "render_context"]);
    assert!(session.context_view().starts_with("Database schema (SQLite):"));
}

#[tokio::test]
async fn test_auth_failure_blocks_everything() {
    let backend = ScriptedBackend { auth: Err("password rejected"), ..Default::default() };
    let mut session = start(&backend).await;

    assert_eq!(session.step(), Step::Done);
    match session.outcome() {
        Some(Outcome::Fatal(e)) => assert_eq!(e.error_code(), "AUTH_FAILED"),
        other => panic!("expected fatal outcome, got {other:?}"),
    }

    type_line(&mut session, &backend, "list users").await;
    pump(&mut session, &backend, key(KeyCode::Tab)).await;
    assert_eq!(session.step(), Step::Done);

    // no context build, no translation
    assert_eq!(backend.calls(), vec!["check_authentication"]);

    pump(&mut session, &backend, key(KeyCode::Esc)).await;
    assert!(session.is_finished());
}

#[tokio::test]
async fn test_context_failure_is_degraded() {
    let backend = ScriptedBackend { context: Err("permission denied"), ..Default::default() };
    let session = start(&backend).await;

    assert_eq!(session.step(), Step::EnterPrompt);
    assert!(session.context_view().contains("permission denied"));
    assert!(session.context_view().contains("Work from the request alone"));
}

#[tokio::test]
async fn test_context_view_follows_lazy_rebuild() {
    let backend = ScriptedBackend {
        context: Err("connection reset"),
        late_context: Some("Database schema (SQLite):\nTable main.orders: id (INTEGER)"),
        ..Default::default()
    };
    let mut session = start(&backend).await;

    pump(&mut session, &backend, key(KeyCode::Tab)).await;
    assert_eq!(session.step(), Step::ShowContext);
    assert!(session.context_view().contains("connection reset"));
    pump(&mut session, &backend, key(KeyCode::Tab)).await;

    type_line(&mut session, &backend, "count orders").await;
    assert_eq!(session.step(), Step::ConfirmRun);
    type_line(&mut session, &backend, "no").await;

    pump(&mut session, &backend, key(KeyCode::Tab)).await;
    assert_eq!(session.step(), Step::ShowContext);
    assert_eq!(session.context_view(), "Database schema (SQLite):\nTable main.orders: id (INTEGER)");
}

#[tokio::test]
async fn test_declined_command_never_executes() {
    let backend = ScriptedBackend::default();
    let mut session = start(&backend).await;

    type_line(&mut session, &backend, "how many users").await;
    assert_eq!(session.step(), Step::ConfirmRun);
    assert_eq!(session.pending().unwrap().command, "SELECT count(*) FROM users");

    type_line(&mut session, &backend, "no").await;

    assert_eq!(session.step(), Step::EnterPrompt);
    assert_eq!(session.prompt_input(), "");
    assert_eq!(session.cursor(), session.history().len());
    assert!(session.history().is_empty());
    assert!(backend.executions().is_empty());
}

#[tokio::test]
async fn test_execute_only_after_yes() {
    let backend = ScriptedBackend::default();
    let mut session = start(&backend).await;

    type_line(&mut session, &backend, "how many users").await;
    for reply in ["", "maybe", "y", "YES", "sure"] {
        type_line(&mut session, &backend, reply).await;
        assert_eq!(session.step(), Step::ConfirmRun);
        assert!(backend.executions().is_empty());
    }

    type_line(&mut session, &backend, "Yes").await;
    assert_eq!(backend.executions(), vec!["execute:SELECT count(*) FROM users"]);
    assert_eq!(session.step(), Step::Done);

    match session.outcome() {
        Some(Outcome::Success(table)) => assert_eq!(table, "count(*)\n--------\n3"),
        other => panic!("expected success, got {other:?}"),
    }

    pump(&mut session, &backend, key(KeyCode::Enter)).await;
    assert_eq!(
        session.history(),
        &[HistoryEntry {
            prompt: "how many users".to_string(),
            mode: Mode::Command,
            command: "SELECT count(*) FROM users".to_string(),
            output: "count(*)\n--------\n3".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_execution_failure_not_recorded() {
    let backend = ScriptedBackend { execution: Err("no such table: users"), ..Default::default() };
    let mut session = start(&backend).await;

    type_line(&mut session, &backend, "how many users").await;
    type_line(&mut session, &backend, "yes").await;

    match session.outcome() {
        Some(Outcome::Recoverable(e)) => assert!(e.to_string().contains("no such table: users")),
        other => panic!("expected recoverable outcome, got {other:?}"),
    }

    pump(&mut session, &backend, key(KeyCode::Enter)).await;
    assert_eq!(session.step(), Step::EnterPrompt);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_history_grows_by_one_per_success() {
    let backend = ScriptedBackend { command: Err("not understood"), ..Default::default() };
    let mut session = start(&backend).await;

    // failed translation, Enter back to the prompt
    type_line(&mut session, &backend, "blorp").await;
    pump(&mut session, &backend, key(KeyCode::Enter)).await;
    assert_eq!(session.history().len(), 0);

    // switch to answer mode and clear the retained prompt
    pump(&mut session, &backend, key(KeyCode::Left)).await;
    for _ in 0.."blorp".len() {
        pump(&mut session, &backend, key(KeyCode::Backspace)).await;
    }

    for (i, prompt) in ["what tables exist", "what is users"].iter().enumerate() {
        type_line(&mut session, &backend, prompt).await;
        assert_eq!(session.history().len(), i);
        pump(&mut session, &backend, key(KeyCode::Enter)).await;
        assert_eq!(session.history().len(), i + 1);
        assert_eq!(session.cursor(), i + 1);
    }

    let last = session.history().last().unwrap();
    assert_eq!(last.mode, Mode::Answer);
    assert_eq!(last.command, "");
    assert_eq!(last.output, "There is one table, users.");
    assert!(backend.executions().is_empty());
}

#[tokio::test]
async fn test_recall_after_answers() {
    let backend = ScriptedBackend::default();
    let mut session = start(&backend).await;
    pump(&mut session, &backend, key(KeyCode::Right)).await;

    for prompt in ["one", "two"] {
        type_line(&mut session, &backend, prompt).await;
        pump(&mut session, &backend, key(KeyCode::Enter)).await;
    }

    pump(&mut session, &backend, key(KeyCode::Up)).await;
    assert_eq!(session.prompt_input(), "two");
    pump(&mut session, &backend, key(KeyCode::Up)).await;
    assert_eq!(session.prompt_input(), "one");

    // resubmitting a recalled prompt records a new entry
    pump(&mut session, &backend, key(KeyCode::Enter)).await;
    pump(&mut session, &backend, key(KeyCode::Enter)).await;
    let prompts: Vec<&str> = session.history().iter().map(|e| e.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["one", "two", "one"]);
}

#[tokio::test]
async fn test_drive_stops_on_ctrl_c_before_checks_finish() {
    let backend: Arc<dyn Backend> = Arc::new(ScriptedBackend::default());
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tx.send(Message::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))).unwrap();

    let mut session = Session::new("scripted");
    let mut frames = 0;
    parley::session::drive(&mut session, backend, tx, rx, |_| {
        frames += 1;
        Ok(())
    })
    .await
    .unwrap();

    assert!(session.is_finished());
    assert_eq!(frames, 1);
}

#[cfg(unix)]
mod kubernetes {
    use super::*;
    use pretty_assertions::assert_eq;
    use parley::config::{Connection, ConnectionDetails, KubernetesDetails};
    use parley::engine::build_adapter;
    use parley::executor::ProcessRunner;
    use parley::translator::{TranslationRequest, Translator};
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Output};

    struct CannedTranslator;

    #[async_trait]
    impl Translator for CannedTranslator {
        async fn complete(&self, request: &TranslationRequest, _mode: Mode) -> Result<String> {
            assert_eq!(request.command_label, "kubectl command");
            assert!(request.context.contains("shop/web-1 (Running)"));
            Ok("Command: kubectl get pods\nSuggested next steps:\n1. Describe a pod\n2. Delete a pod"
                .to_string())
        }
    }

    #[derive(Default)]
    struct FakeCluster {
        shell: Mutex<Vec<String>>,
    }

    fn ok(stdout: &str) -> Output {
        Output { status: ExitStatus::from_raw(0), stdout: stdout.as_bytes().to_vec(), stderr: Vec::new() }
    }

    #[async_trait]
    impl ProcessRunner for FakeCluster {
        async fn run(&self, program: &str, args: &[String]) -> std::io::Result<Output> {
            if program == "sh" {
                self.shell.lock().unwrap().push(args[1].clone());
                return Ok(ok("NAME    READY   STATUS\nweb-1   1/1     Running\n"));
            }
            if args.join(" ") == "config current-context" {
                return Ok(ok("aks-dev\n"));
            }
            let body = match args.get(3).map(String::as_str) {
                Some("pods") => {
                    r#"{"items":[{"metadata":{"name":"web-1","namespace":"shop"},"status":{"phase":"Running"}}]}"#
                }
                _ => r#"{"items":[]}"#,
            };
            Ok(ok(body))
        }
    }

    #[tokio::test]
    async fn test_list_all_pods_scenario() {
        let cluster = Arc::new(FakeCluster::default());
        let connection = Connection::new(
            "aks",
            ConnectionDetails::Kubernetes(KubernetesDetails { context: "aks-dev".to_string() }),
        );
        let adapter = build_adapter(&connection, Arc::new(CannedTranslator), cluster.clone()).unwrap();

        let mut session = start(&adapter).await;
        type_line(&mut session, &adapter, "list all pods").await;

        assert_eq!(session.step(), Step::ConfirmRun);
        let pending = session.pending().unwrap();
        assert_eq!(pending.command, "kubectl get pods");
        assert_eq!(pending.suggestions, vec!["Describe a pod", "Delete a pod"]);
        assert!(cluster.shell.lock().unwrap().is_empty());

        type_line(&mut session, &adapter, "yes").await;
        assert_eq!(*cluster.shell.lock().unwrap(), vec!["kubectl get pods"]);

        match session.outcome() {
            Some(Outcome::Success(table)) => {
                assert_eq!(table, "NAME   READY  STATUS\n-----  -----  -------\nweb-1  1/1    Running");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }
}
