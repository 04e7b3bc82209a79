use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use recon_core::api::{ControlState, LogLine, LogStream, OrchestrationController, RunSession};

use super::app::{artifact_rows, Focus, InputMode, PanelApp};
use crate::commands::artifacts::human_size;

pub fn draw(f: &mut Frame<'_>, app: &PanelApp, ctl: &OrchestrationController) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], app, ctl);
    draw_environment(f, chunks[1], app, ctl);
    draw_main(f, chunks[2], app, ctl);
    draw_footer(f, chunks[3], app, ctl);
}

fn state_style(state: ControlState) -> Style {
    match state {
        ControlState::Idle | ControlState::Validating => Style::default().fg(Color::Yellow),
        ControlState::Ready => Style::default().fg(Color::Cyan),
        ControlState::Running => Style::default().fg(Color::Green),
        ControlState::Success => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        ControlState::Fail => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

fn draw_header(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let state = ctl.state();
    let mut first = vec![
        Span::styled("recon-panel", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  State: "),
        Span::styled(state.to_string(), state_style(state)),
    ];
    if let Some(session) = ctl.session() {
        first.push(Span::raw("  Session: "));
        first.push(Span::styled(
            session.id.chars().take(8).collect::<String>(),
            Style::default().fg(Color::Gray),
        ));
        first.push(Span::raw("  "));
        first.push(session_summary(session));
    }

    let second = if app.input_mode == InputMode::Targets {
        Line::from(vec![
            Span::raw("Targets: "),
            Span::styled(app.input_buffer.clone(), Style::default().fg(Color::Cyan)),
            Span::styled("  (comma-separated, Enter: apply, Esc: discard)", Style::default().fg(Color::DarkGray)),
        ])
    } else {
        let targets = if app.targets_input.trim().is_empty() {
            "(saved list)".to_string()
        } else {
            app.targets_input.clone()
        };
        Line::from(vec![
            Span::raw("Stage: "),
            Span::styled(app.stage.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("  Headless: "),
            Span::styled(
                if app.headless { "on" } else { "off" },
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("  Targets: "),
            Span::styled(targets, Style::default().fg(Color::Gray)),
        ])
    };

    let header = Paragraph::new(vec![Line::from(first), second])
        .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, area);

    if app.input_mode == InputMode::Targets {
        let col = app.input_buffer[..app.input_cursor].chars().count() as u16;
        f.set_cursor_position((area.x + 9 + col, area.y + 1));
    }
}

fn session_summary(session: &RunSession) -> Span<'static> {
    match (&session.outcome, &session.summary) {
        (Some(outcome), Some(summary)) => {
            let style = if outcome.is_success() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Red)
            };
            Span::styled(
                format!(
                    "{} `{}`: {} ({:.1}s, {} lines)",
                    if outcome.is_success() { "OK" } else { "FAILED" },
                    session.request.stage,
                    outcome,
                    summary.duration_ms as f64 / 1000.0,
                    summary.lines
                ),
                style,
            )
        }
        _ => Span::styled(
            format!("running `{}`", session.request.stage),
            Style::default().fg(Color::Green),
        ),
    }
}

fn draw_environment(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let mut spans = Vec::new();
    match ctl.report() {
        None => spans.push(Span::styled("checking environment...", Style::default().fg(Color::Yellow))),
        Some(report) => {
            for (name, check) in &report.checks {
                let (mark, color) = if check.ok { ("✓", Color::Green) } else { ("✗", Color::Red) };
                spans.push(Span::styled(format!("{mark} {name}  "), Style::default().fg(color)));
            }
            if !ctl.run_enabled() {
                spans.push(Span::styled(
                    "Run disabled",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                ));
            }
        }
    }
    if let Some(versions) = &app.versions {
        for v in versions {
            spans.push(Span::styled(
                format!("  {}: {}", v.binary, v.version.as_deref().unwrap_or("not found")),
                Style::default().fg(Color::Gray),
            ));
        }
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_main(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    draw_logs(f, chunks[0], app, ctl);
    if app.preview.is_some() {
        draw_preview(f, chunks[1], app);
    } else {
        draw_artifacts(f, chunks[1], app, ctl);
    }
}

fn panel_block(title: String, active: bool) -> Block<'static> {
    let mut block = Block::default().borders(Borders::ALL).title(title);
    if active {
        block = block.border_style(Style::default().fg(Color::Cyan));
    }
    block
}

fn log_line(line: &LogLine) -> Line<'_> {
    let style = match line.stream {
        LogStream::Stdout => Style::default(),
        LogStream::Stderr => Style::default().fg(Color::Red),
        LogStream::Marker => Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
    };
    Line::from(Span::styled(line.text.as_str(), style))
}

fn draw_logs(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let history = ctl.history();
    let title = if app.follow {
        format!("Log ({} lines)", history.len())
    } else {
        format!("Log ({} lines, paused; G: follow)", history.len())
    };
    let lines: Vec<Line> = history.iter().map(log_line).collect();
    let offset = scroll_offset(lines.len(), area.height.saturating_sub(2), app);
    let widget = Paragraph::new(lines)
        .block(panel_block(title, app.focus == Focus::Logs))
        .scroll((offset, 0));
    f.render_widget(widget, area);
}

fn scroll_offset(lines_len: usize, height: u16, app: &PanelApp) -> u16 {
    if height == 0 {
        return 0;
    }
    let max_offset = lines_len.saturating_sub(height as usize);
    let offset = if app.follow {
        max_offset
    } else {
        app.log_scroll.min(max_offset)
    };
    offset.min(u16::MAX as usize) as u16
}

fn draw_artifacts(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let index = ctl.artifacts();
    let active = app.focus == Focus::Artifacts;
    let block = panel_block(format!("Artifacts ({})", index.len()), active);

    if index.is_empty() {
        let widget = Paragraph::new(vec![
            Line::from("No data yet."),
            Line::from(Span::styled(
                "Run a stage to produce output, then press a to refresh.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .block(block)
        .wrap(Wrap { trim: false });
        f.render_widget(widget, area);
        return;
    }

    let rows = artifact_rows(index);
    let selected = app.selected.min(rows.len().saturating_sub(1));
    let mut lines = Vec::new();
    let mut selected_line = 0;
    let mut current = None;
    for (i, entry) in rows.iter().enumerate() {
        if current != Some(entry.category) {
            current = Some(entry.category);
            lines.push(Line::from(Span::styled(
                entry.category.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
        }
        let mut style = Style::default().fg(Color::Gray);
        if i == selected && active {
            style = style.add_modifier(Modifier::REVERSED);
            selected_line = lines.len();
        }
        lines.push(Line::from(Span::styled(
            format!("  {}  {}", entry.display, human_size(entry.size_bytes)),
            style,
        )));
    }
    let height = area.height.saturating_sub(2) as usize;
    let offset = selected_line.saturating_sub(height.saturating_sub(1));
    let widget = Paragraph::new(lines)
        .block(block)
        .scroll((offset.min(u16::MAX as usize) as u16, 0));
    f.render_widget(widget, area);
}

fn draw_preview(f: &mut Frame<'_>, area: Rect, app: &PanelApp) {
    let Some(preview) = &app.preview else {
        return;
    };
    let style = if preview.is_error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };
    let lines: Vec<Line> = preview
        .lines
        .iter()
        .map(|l| Line::from(Span::styled(l.as_str(), style)))
        .collect();
    let widget = Paragraph::new(lines)
        .block(panel_block(format!("Preview: {} (Esc: close)", preview.title), true))
        .wrap(Wrap { trim: false });
    f.render_widget(widget, area);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &PanelApp, ctl: &OrchestrationController) {
    let status_style = if ctl.last_error().is_some() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Gray)
    };
    let hint = match app.input_mode {
        InputMode::Targets => "Enter: apply  Esc: discard",
        InputMode::Normal if ctl.state() == ControlState::Running => {
            "x/Esc: cancel  Tab: focus  j/k: scroll  G: follow  q: cancel and quit"
        }
        InputMode::Normal => {
            "r: run  s: stage  h: headless  t: targets  v: revalidate  a: artifacts  i: versions  Tab: focus  Enter: preview  q: quit"
        }
    };
    let lines = vec![
        Line::from(Span::styled(ctl.status().to_string(), status_style)),
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))),
    ];
    let footer = Paragraph::new(lines).block(Block::default().borders(Borders::TOP));
    f.render_widget(footer, area);
}
