//! Session rendering with ratatui

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::{Outcome, Session, Step};
use crate::translator::Mode;

const SPINNER_FRAMES: &[&str] = &["   ", ".  ", ".. ", "..."];

/// Main draw function, renders the full session layout
pub fn draw(frame: &mut Frame, session: &Session) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // status bar
            Constraint::Min(3),    // body
            Constraint::Length(1), // key hints
            Constraint::Length(3), // input
        ])
        .split(frame.area());

    draw_status_bar(frame, session, outer[0]);
    draw_body(frame, session, outer[1]);
    draw_hints(frame, session, outer[2]);
    draw_input(frame, session, outer[3]);
}

// ── status bar ──────────────────────────────────────────────────────────

fn draw_status_bar(frame: &mut Frame, session: &Session, area: Rect) {
    let mode_span = match session.mode() {
        Mode::Command => Span::styled(" COMMAND ", Style::default().bg(Color::Blue).fg(Color::Black).bold()),
        Mode::Answer => Span::styled(" ANSWER ", Style::default().bg(Color::Green).fg(Color::Black).bold()),
    };

    let mut spans = vec![
        mode_span,
        Span::raw(format!(" parley \u{00b7} {} ", session.title())),
    ];

    if let Some(activity) = activity(session.step()) {
        let dots = SPINNER_FRAMES[session.ticks() % SPINNER_FRAMES.len()];
        let text = format!("{activity}{dots}");

        let used: usize = spans.iter().map(|s| s.content.width()).sum();
        let padding = (area.width as usize).saturating_sub(used + text.width());
        spans.push(Span::raw(" ".repeat(padding)));
        spans.push(Span::styled(text, Style::default().fg(Color::Yellow).bold()));
    }

    let p = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::Rgb(20, 20, 20)).fg(Color::White));
    frame.render_widget(p, area);
}

const fn activity(step: Step) -> Option<&'static str> {
    match step {
        Step::InitialChecks => Some("Checking backend"),
        Step::GenerateCommand => Some("Translating"),
        Step::GetAnswer => Some("Thinking"),
        Step::RunCommand => Some("Running"),
        _ => None,
    }
}

// ── body ────────────────────────────────────────────────────────────────

fn draw_body(frame: &mut Frame, session: &Session, area: Rect) {
    let (title, text) = match session.step() {
        Step::ShowContext => (" Context ", Text::raw(session.context_view().to_string())),
        Step::ConfirmRun => (" Confirm ", confirm_text(session)),
        Step::Done => (" Result ", outcome_text(session)),
        _ => (" History ", history_text(session)),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Blue))
        .title(title);

    let paragraph = Paragraph::new(text).block(block).wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn history_text(session: &Session) -> Text<'static> {
    let mut lines = Vec::new();
    for entry in session.history() {
        lines.push(Line::from(vec![
            Span::styled(format!("[{}] ", entry.mode), Style::default().fg(Color::DarkGray)),
            Span::styled(entry.prompt.clone(), Style::default().bold()),
        ]));
        if !entry.command.is_empty() {
            lines.push(Line::styled(format!("  $ {}", entry.command), Style::default().fg(Color::Cyan)));
        }
        lines.extend(entry.output.lines().map(|l| Line::raw(format!("  {l}"))));
        lines.push(Line::raw(""));
    }

    if session.step().is_busy() && !session.submitted().is_empty() {
        lines.push(Line::styled(format!("> {}", session.submitted()), Style::default().fg(Color::DarkGray)));
    }
    Text::from(lines)
}

fn confirm_text(session: &Session) -> Text<'static> {
    let Some(pending) = session.pending() else {
        return Text::default();
    };

    let mut lines = vec![
        Line::raw(format!("Request: {}", session.submitted())),
        Line::raw(""),
        Line::styled(pending.command.clone(), Style::default().fg(Color::Cyan).bold()),
        Line::raw(""),
    ];
    if !pending.suggestions.is_empty() {
        lines.push(Line::styled("Suggested next steps:", Style::default().fg(Color::DarkGray)));
        lines.extend(
            pending
                .suggestions
                .iter()
                .enumerate()
                .map(|(i, s)| Line::styled(format!("  {}. {s}", i + 1), Style::default().fg(Color::DarkGray))),
        );
        lines.push(Line::raw(""));
    }
    lines.push(Line::styled("Run this command? Type yes or no.", Style::default().fg(Color::Yellow).bold()));
    Text::from(lines)
}

fn outcome_text(session: &Session) -> Text<'static> {
    match session.outcome() {
        Some(Outcome::Success(output)) => Text::raw(output.clone()),
        Some(Outcome::Recoverable(e) | Outcome::Fatal(e)) => Text::from(vec![
            Line::styled(format!("[{}]", e.error_code()), Style::default().fg(Color::Red).bold()),
            Line::styled(e.to_string(), Style::default().fg(Color::Red)),
        ]),
        None => Text::default(),
    }
}

// ── hints and input ─────────────────────────────────────────────────────

fn draw_hints(frame: &mut Frame, session: &Session, area: Rect) {
    let hint = match (session.step(), session.outcome()) {
        (Step::EnterPrompt, _) => "Enter submit \u{00b7} \u{2190}/\u{2192} mode \u{00b7} \u{2191}/\u{2193} history \u{00b7} Tab context \u{00b7} Esc quit",
        (Step::ShowContext, _) => "Tab back",
        (Step::ConfirmRun, _) => "yes/no then Enter \u{00b7} Esc cancel",
        (Step::Done, Some(Outcome::Fatal(_))) => "q quit",
        (Step::Done, _) => "Enter continue \u{00b7} q quit",
        _ => "Ctrl+C quit",
    };
    frame.render_widget(Paragraph::new(hint).style(Style::default().fg(Color::DarkGray)), area);
}

fn draw_input(frame: &mut Frame, session: &Session, area: Rect) {
    let (title, input) = match session.step() {
        Step::ConfirmRun => (" Confirm ".to_string(), session.confirm_input()),
        _ => (format!(" Prompt ({} mode) ", session.mode()), session.prompt_input()),
    };
    let editable = matches!(session.step(), Step::EnterPrompt | Step::ConfirmRun);

    let border = if editable { Color::Green } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
        .title(title);

    frame.render_widget(Paragraph::new(input).block(block), area);

    if editable {
        let max = area.width.saturating_sub(2);
        let offset = u16::try_from(input.width()).unwrap_or(max).min(max.saturating_sub(1));
        frame.set_cursor_position((area.x + 1 + offset, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    fn screen(session: &Session) -> String {
        let mut terminal = Terminal::new(TestBackend::new(60, 12)).unwrap();
        terminal.draw(|frame| draw(frame, session)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer.content().iter().map(|cell| cell.symbol()).collect()
    }

    #[test]
    fn test_fatal_error_shown_with_quit_hint() {
        let mut session = Session::new("prod-db");
        session.start();
        session.update(Message::Checked(Err(crate::error::ParleyError::auth("bad password"))));

        let text = screen(&session);
        assert!(text.contains("AUTH_FAILED"));
        assert!(text.contains("q quit"));
        assert!(!text.contains("Enter continue"));
    }

    #[test]
    fn test_prompt_input_rendered() {
        let mut session = Session::new("prod-db");
        session.start();
        session.update(Message::Checked(Ok(String::new())));
        for c in "count users".chars() {
            session.update(Message::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }

        let text = screen(&session);
        assert!(text.contains("Prompt (command mode)"));
        assert!(text.contains("count users"));
        assert!(text.contains("parley \u{00b7} prod-db"));
    }
}
