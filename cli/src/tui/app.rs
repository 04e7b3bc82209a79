use crossterm::event::KeyEvent;
use recon_core::api::{
    parse_targets_input, ArtifactEntry, ArtifactIndex, Category, ControllerError, Preview,
    RunRequest, Stage, TuiConfig, VersionInfo,
};

use crate::commands::artifacts::human_size;

/// Longest structured preview shown before truncation.
const PREVIEW_MAX_LINES: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Logs,
    Artifacts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Targets,
}

/// What the panel loop should ask the controller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Run,
    Cancel,
    Revalidate,
    RefreshArtifacts,
    ProbeVersions,
    Preview(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewView {
    pub title: String,
    pub lines: Vec<String>,
    pub is_error: bool,
}

impl PreviewView {
    pub fn build(title: &str, result: Result<Preview, ControllerError>) -> Self {
        match result {
            Ok(Preview::Structured { value, .. }) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
                let total = text.lines().count();
                let mut lines: Vec<String> =
                    text.lines().take(PREVIEW_MAX_LINES).map(str::to_string).collect();
                if total > PREVIEW_MAX_LINES {
                    lines.push(format!("... ({} more lines)", total - PREVIEW_MAX_LINES));
                }
                Self {
                    title: title.to_string(),
                    lines,
                    is_error: false,
                }
            }
            Ok(Preview::Binary { bytes, meta }) => Self {
                title: title.to_string(),
                lines: vec![
                    format!("{} ({})", meta.category, meta.media_type),
                    format!("size: {}", human_size(bytes.len() as u64)),
                    format!("path: {}", meta.path.display()),
                    String::new(),
                    "Open it with an external viewer.".to_string(),
                ],
                is_error: false,
            },
            Err(e) => Self {
                title: title.to_string(),
                lines: vec![e.user_message()],
                is_error: true,
            },
        }
    }
}

/// Operator-side state of the panel. Run state lives in the controller.
pub struct PanelApp {
    pub config: TuiConfig,
    pub stage: Stage,
    pub headless: bool,
    pub targets_input: String,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub input_cursor: usize,
    pub focus: Focus,
    pub follow: bool,
    pub log_scroll: usize,
    pub selected: usize,
    pub preview: Option<PreviewView>,
    pub versions: Option<Vec<VersionInfo>>,
    pub quit_requested: bool,
}

impl PanelApp {
    pub fn new(config: TuiConfig, headless: bool) -> Self {
        Self {
            config,
            stage: Stage::All,
            headless,
            targets_input: String::new(),
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            input_cursor: 0,
            focus: Focus::Logs,
            follow: true,
            log_scroll: 0,
            selected: 0,
            preview: None,
            versions: None,
            quit_requested: false,
        }
    }

    /// The request a run started now would carry. Empty targets keep the saved list.
    pub fn request(&self) -> RunRequest {
        RunRequest {
            stage: self.stage,
            targets: parse_targets_input(&self.targets_input),
            headless: self.headless,
        }
    }

    /// A new run starts with a fresh, followed log.
    pub fn on_run_started(&mut self) {
        self.follow = true;
        self.log_scroll = 0;
    }

    pub fn handle_key(&mut self, key: KeyEvent, running: bool, artifact_count: usize) -> Action {
        match self.input_mode {
            InputMode::Targets => {
                self.handle_targets_key(key);
                Action::None
            }
            InputMode::Normal => self.handle_normal_key(key, running, artifact_count),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent, running: bool, artifact_count: usize) -> Action {
        use crossterm::event::KeyCode;
        use crossterm::event::KeyModifiers;

        match key.code {
            KeyCode::Char('q') => return self.quit(running),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return self.quit(running)
            }
            KeyCode::Char('r') | KeyCode::F(5) => return Action::Run,
            KeyCode::Char('x') => return Action::Cancel,
            KeyCode::Esc => {
                if self.preview.take().is_none() && running {
                    return Action::Cancel;
                }
            }
            KeyCode::Char('v') => return Action::Revalidate,
            KeyCode::Char('a') => return Action::RefreshArtifacts,
            KeyCode::Char('i') => return Action::ProbeVersions,
            KeyCode::Char('s') => self.stage = self.stage.next(),
            KeyCode::Char('h') => self.headless = !self.headless,
            KeyCode::Char('t') => {
                self.input_mode = InputMode::Targets;
                self.input_buffer = self.targets_input.clone();
                self.input_cursor = self.input_buffer.len();
            }
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Logs => Focus::Artifacts,
                    Focus::Artifacts => Focus::Logs,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.move_down(1, artifact_count),
            KeyCode::PageUp => self.move_up(10),
            KeyCode::PageDown => self.move_down(10, artifact_count),
            KeyCode::Char('g') => match self.focus {
                Focus::Logs => {
                    self.follow = false;
                    self.log_scroll = 0;
                }
                Focus::Artifacts => self.selected = 0,
            },
            KeyCode::Char('G') => match self.focus {
                Focus::Logs => self.follow = true,
                Focus::Artifacts => self.selected = artifact_count.saturating_sub(1),
            },
            KeyCode::Enter if self.focus == Focus::Artifacts && artifact_count > 0 => {
                return Action::Preview(self.selected.min(artifact_count - 1));
            }
            _ => {}
        }
        Action::None
    }

    fn quit(&mut self, running: bool) -> Action {
        self.quit_requested = true;
        if running {
            // Leave once the stage has stopped.
            Action::Cancel
        } else {
            Action::Quit
        }
    }

    fn handle_targets_key(&mut self, key: KeyEvent) {
        use crossterm::event::KeyCode;

        match key.code {
            KeyCode::Enter => {
                self.targets_input = std::mem::take(&mut self.input_buffer);
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Esc => {
                self.input_buffer.clear();
                self.input_mode = InputMode::Normal;
            }
            KeyCode::Backspace => self.backspace(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.input_cursor = 0,
            KeyCode::End => self.input_cursor = self.input_buffer.len(),
            KeyCode::Char(ch) => self.insert_char(ch),
            _ => {}
        }
    }

    fn move_up(&mut self, amount: usize) {
        match self.focus {
            Focus::Logs => {
                self.follow = false;
                self.log_scroll = self.log_scroll.saturating_sub(amount);
            }
            Focus::Artifacts => self.selected = self.selected.saturating_sub(amount),
        }
    }

    fn move_down(&mut self, amount: usize, artifact_count: usize) {
        match self.focus {
            Focus::Logs => {
                self.follow = false;
                self.log_scroll = self.log_scroll.saturating_add(amount);
            }
            Focus::Artifacts => {
                self.selected = (self.selected + amount).min(artifact_count.saturating_sub(1));
            }
        }
    }

    fn insert_char(&mut self, ch: char) {
        self.input_buffer.insert(self.input_cursor, ch);
        self.input_cursor += ch.len_utf8();
    }

    fn backspace(&mut self) {
        if self.input_cursor == 0 {
            return;
        }
        let prev = prev_char_boundary(&self.input_buffer, self.input_cursor);
        self.input_buffer.replace_range(prev..self.input_cursor, "");
        self.input_cursor = prev;
    }

    fn move_left(&mut self) {
        self.input_cursor = prev_char_boundary(&self.input_buffer, self.input_cursor);
    }

    fn move_right(&mut self) {
        self.input_cursor = next_char_boundary(&self.input_buffer, self.input_cursor);
    }
}

/// Artifacts in display order: by category, then path.
pub fn artifact_rows(index: &ArtifactIndex) -> Vec<&ArtifactEntry> {
    Category::ALL
        .iter()
        .flat_map(|c| index.category(*c).iter())
        .collect()
}

fn prev_char_boundary(s: &str, idx: usize) -> usize {
    s[..idx].char_indices().last().map(|(i, _)| i).unwrap_or(0)
}

fn next_char_boundary(s: &str, idx: usize) -> usize {
    match s[idx..].chars().next() {
        Some(ch) => idx + ch.len_utf8(),
        None => s.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyModifiers};
    use pretty_assertions::assert_eq;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> PanelApp {
        PanelApp::new(TuiConfig::default(), true)
    }

    #[test]
    fn stage_and_headless_toggles_shape_the_request() {
        let mut a = app();
        a.handle_key(key(KeyCode::Char('s')), false, 0);
        a.handle_key(key(KeyCode::Char('s')), false, 0);
        a.handle_key(key(KeyCode::Char('h')), false, 0);
        let req = a.request();
        assert_eq!(req.stage, Stage::Analyze);
        assert!(!req.headless);
        assert!(req.targets.is_empty());
    }

    #[test]
    fn targets_editor_commits_on_enter_and_discards_on_esc() {
        let mut a = app();
        a.handle_key(key(KeyCode::Char('t')), false, 0);
        for ch in "alice, bob".chars() {
            a.handle_key(key(KeyCode::Char(ch)), false, 0);
        }
        a.handle_key(key(KeyCode::Backspace), false, 0);
        a.handle_key(key(KeyCode::Enter), false, 0);
        assert_eq!(a.input_mode, InputMode::Normal);
        assert_eq!(a.request().targets, vec!["alice", "bo"]);

        a.handle_key(key(KeyCode::Char('t')), false, 0);
        a.handle_key(key(KeyCode::Char('x')), false, 0);
        a.handle_key(key(KeyCode::Esc), false, 0);
        assert_eq!(a.targets_input, "alice, bo");
    }

    #[test]
    fn quitting_while_running_cancels_first() {
        let mut a = app();
        assert_eq!(a.handle_key(key(KeyCode::Char('q')), true, 0), Action::Cancel);
        assert!(a.quit_requested);

        let mut b = app();
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(b.handle_key(ctrl_c, false, 0), Action::Quit);
    }

    #[test]
    fn esc_closes_preview_before_cancelling() {
        let mut a = app();
        a.preview = Some(PreviewView {
            title: "data/profiles.json".into(),
            lines: vec![],
            is_error: false,
        });
        assert_eq!(a.handle_key(key(KeyCode::Esc), true, 0), Action::None);
        assert!(a.preview.is_none());
        assert_eq!(a.handle_key(key(KeyCode::Esc), true, 0), Action::Cancel);
    }

    #[test]
    fn artifact_selection_is_clamped() {
        let mut a = app();
        a.handle_key(key(KeyCode::Tab), false, 3);
        for _ in 0..5 {
            a.handle_key(key(KeyCode::Down), false, 3);
        }
        assert_eq!(a.selected, 2);
        assert_eq!(a.handle_key(key(KeyCode::Enter), false, 3), Action::Preview(2));
        assert_eq!(a.handle_key(key(KeyCode::Enter), false, 0), Action::None);
    }

    #[test]
    fn scrolling_logs_stops_following() {
        let mut a = app();
        a.handle_key(key(KeyCode::Char('k')), false, 0);
        assert!(!a.follow);
        a.handle_key(key(KeyCode::Char('G')), false, 0);
        assert!(a.follow);
    }

    #[test]
    fn preview_errors_are_shown_inline() {
        let err = ControllerError::Preview(recon_core::api::PreviewError::Missing {
            path: "data/profiles.json".into(),
        });
        let view = PreviewView::build("data/profiles.json", Err(err));
        assert!(view.is_error);
        assert_eq!(view.lines, vec!["data/profiles.json does not exist"]);
    }
}
