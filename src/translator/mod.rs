//! Translator contract
//!
//! The translator turns an operator prompt plus the backend context into
//! either a command (with suggested next steps) or a prose answer. The model
//! service is reached through the [`Translator`] trait so sessions and tests
//! can swap the transport; parsing and validation live here and are shared.
//!
//! Command-mode responses use a fixed micro-format:
//!
//! ```text
//! Command: <single-line command>
//! Suggested next steps:
//! 1. <step>
//! 2. <step>
//! ```

pub mod anthropic;

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use tracing::debug;

use crate::error::{ParleyError, Result};

pub use anthropic::{AnthropicTranslator, HttpClient, HttpResponse, ReqwestHttpClient};

const COMMAND_PREFIX: &str = "Command:";
const SUGGESTIONS_HEADER: &str = "Suggested next steps:";

/// What the operator wants back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// An executable command, gated by confirmation
    #[default]
    Command,
    /// A prose answer, nothing is run
    Answer,
}

impl Mode {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Command => Self::Answer,
            Self::Answer => Self::Command,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Answer => write!(f, "answer"),
        }
    }
}

/// One translation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub prompt: String,
    /// e.g. "SQL query", "kubectl command"
    pub command_label: String,
    /// Rendered backend context
    pub context: String,
}

/// Parsed command-mode response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Translation {
    pub command: String,
    pub suggestions: Vec<String>,
}

/// Transport to the language model service
#[async_trait]
pub trait Translator: Send + Sync {
    /// Send the request and return the raw response text
    async fn complete(&self, request: &TranslationRequest, mode: Mode) -> Result<String>;
}

/// Build the model prompt for a request
#[must_use]
pub fn build_prompt(request: &TranslationRequest, mode: Mode) -> String {
    let label = &request.command_label;
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are an operations assistant working against a backend that is driven by {label}s.\n\n"
    ));
    prompt.push_str("Backend context:\n");
    prompt.push_str(&request.context);
    prompt.push_str("\n\n");

    match mode {
        Mode::Command => {
            prompt.push_str(&format!(
                "Translate the request below into exactly one {label}. \
                 Reply using this format and nothing else:\n\n\
                 {COMMAND_PREFIX} <single-line {label}>\n\
                 {SUGGESTIONS_HEADER}\n\
                 1. <follow-up the operator might ask next>\n\
                 2. <another follow-up>\n\n"
            ));
        }
        Mode::Answer => {
            prompt.push_str(
                "Answer the question below directly in plain prose, using the backend context. \
                 Do not propose commands to run.\n\n",
            );
        }
    }

    prompt.push_str("Request: ");
    prompt.push_str(&request.prompt);
    prompt
}

/// Parse a command-mode response
///
/// A response without a `Command:` line yields an empty command; callers
/// treat that as "not understood".
pub fn parse_response(text: &str) -> Result<Translation> {
    let numbered = Regex::new(r"^\d+\.\s+(.*)$")
        .map_err(|e| ParleyError::translation(format!("Invalid suggestion pattern: {e}")))?;

    let command = text
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(COMMAND_PREFIX))
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let suggestions = text
        .lines()
        .map(str::trim)
        .skip_while(|line| !line.starts_with(SUGGESTIONS_HEADER))
        .skip(1)
        .filter_map(|line| numbered.captures(line).map(|caps| caps[1].trim().to_string()))
        .collect();

    Ok(Translation { command, suggestions })
}

/// Render a translation back into the micro-format
///
/// Parsing inverts this for commands free of newlines and non-empty steps,
/// both without surrounding whitespace. Anything else comes back trimmed, and
/// a blank step renders as a bare `N.` marker that parsing skips.
#[must_use]
pub fn render_response(translation: &Translation) -> String {
    let mut out = format!("{COMMAND_PREFIX} {}\n{SUGGESTIONS_HEADER}", translation.command);
    for (i, step) in translation.suggestions.iter().enumerate() {
        out.push_str(&format!("\n{}. {step}", i + 1));
    }
    out
}

/// Request a command, parse it and run the backend-specific validation
pub async fn translate_command(
    translator: &dyn Translator,
    request: &TranslationRequest,
    validate: impl Fn(&str) -> Result<String> + Send,
) -> Result<Translation> {
    let raw = translator.complete(request, Mode::Command).await?;
    debug!(response = %raw, "Translator command response");

    let parsed = parse_response(&raw)?;
    if parsed.command.is_empty() {
        return Err(ParleyError::translation(format!(
            "The request was not understood as a {}. Try rephrasing it.",
            request.command_label
        )));
    }

    let command = validate(&parsed.command)?;
    Ok(Translation { command, suggestions: parsed.suggestions })
}

/// Request a prose answer
pub async fn translate_answer(
    translator: &dyn Translator,
    request: &TranslationRequest,
) -> Result<String> {
    let raw = translator.complete(request, Mode::Answer).await?;
    debug!(response = %raw, "Translator answer response");

    let answer = raw.trim();
    if answer.is_empty() {
        return Err(ParleyError::translation("The model returned an empty answer"));
    }
    Ok(answer.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> TranslationRequest {
        TranslationRequest {
            prompt: "show pods".to_string(),
            command_label: "kubectl command".to_string(),
            context: "Namespaces: default".to_string(),
        }
    }

    #[test]
    fn test_parse_full_response() {
        let text = "Command: kubectl get pods -A\nSuggested next steps:\n1. Describe a pod\n2. Show logs";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.command, "kubectl get pods -A");
        assert_eq!(parsed.suggestions, vec!["Describe a pod", "Show logs"]);
    }

    #[test]
    fn test_parse_tolerates_surrounding_prose() {
        let text = "Sure! Here you go.\n\n  Command:   SELECT 1  \nSome chatter\nSuggested next steps:\nnot numbered\n10.  Tenth step\n3) wrong marker";
        let parsed = parse_response(text).unwrap();
        assert_eq!(parsed.command, "SELECT 1");
        assert_eq!(parsed.suggestions, vec!["Tenth step"]);
    }

    #[test]
    fn test_numbered_lines_before_header_ignored() {
        let text = "1. not a suggestion\nCommand: az vm list\nSuggested next steps:\n1. Start a VM";
        assert_eq!(parse_response(text).unwrap().suggestions, vec!["Start a VM"]);
    }

    #[test]
    fn test_missing_command_is_empty() {
        let parsed = parse_response("I cannot help with that.").unwrap();
        assert_eq!(parsed, Translation::default());
    }

    #[test]
    fn test_round_trip() {
        let translation = Translation {
            command: "kubectl get svc -n web".to_string(),
            suggestions: vec!["Scale the deployment".to_string(), "Check endpoints".to_string()],
        };
        assert_eq!(parse_response(&render_response(&translation)).unwrap(), translation);
    }

    #[test]
    fn test_prompt_mentions_label_context_and_format() {
        let prompt = build_prompt(&request(), Mode::Command);
        assert!(prompt.contains("exactly one kubectl command"));
        assert!(prompt.contains("Namespaces: default"));
        assert!(prompt.contains("Command: <single-line kubectl command>"));
        assert!(prompt.ends_with("Request: show pods"));

        let prompt = build_prompt(&request(), Mode::Answer);
        assert!(!prompt.contains(COMMAND_PREFIX));
        assert!(prompt.contains("plain prose"));
    }

    #[test]
    fn test_mode_toggle() {
        assert_eq!(Mode::Command.toggled(), Mode::Answer);
        assert_eq!(Mode::Answer.toggled().toggled(), Mode::Answer);
    }
}
