//! Single-line prompt on the row above the quotes header.
//!
//! Supports the usual readline motions: arrows or Ctrl-B/Ctrl-F to move,
//! Ctrl-A/Ctrl-E (or Home/End) to jump, Backspace to delete. Enter submits,
//! Esc abandons.

use crate::layout::PROMPT_ROW;
use crate::profile::Profile;
use crate::screen::Screen;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::style::{Color, Style};

/// What the line is being collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCommand {
    AddTickers,
    RemoveTickers,
    SetFilter,
}

/// Parsed result of a submitted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    AddTickers(Vec<String>),
    RemoveTickers(Vec<String>),
    SetFilter(String),
    ClearFilter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Still editing
    Pending,
    /// Finished; `None` when cancelled or there was nothing to do
    Done(Option<Submission>),
}

#[derive(Debug)]
pub struct LineEditor {
    command: LineCommand,
    prompt: String,
    input: Vec<char>,
    cursor: usize,
}

impl LineEditor {
    /// Show the prompt and park the cursor after it.
    pub fn prompt(command: LineCommand, screen: &mut Screen, profile: &Profile) -> Self {
        let prompt = match command {
            LineCommand::AddTickers => "Add tickers: ".to_string(),
            LineCommand::RemoveTickers => "Remove tickers: ".to_string(),
            LineCommand::SetFilter if profile.filter().is_active() => {
                format!("Set filter ({}): ", profile.filter().source())
            }
            LineCommand::SetFilter => "Set filter: ".to_string(),
        };

        let editor = Self {
            command,
            prompt,
            input: Vec::new(),
            cursor: 0,
        };
        editor.redraw(screen);
        editor
    }

    /// Draw the prompt, the input so far and the cursor, e.g. after the
    /// surface was wiped by a resize.
    pub fn redraw(&self, screen: &mut Screen) {
        screen.clear_line(0, PROMPT_ROW);
        screen.draw_plain(0, PROMPT_ROW, &self.prompt, Style::default().fg(Color::White));
        screen.draw_plain(self.prompt_width(), PROMPT_ROW, &self.input(), Style::default());
        self.place_cursor(screen);
    }

    pub fn command(&self) -> LineCommand {
        self.command
    }

    pub fn input(&self) -> String {
        self.input.iter().collect()
    }

    pub fn handle(&mut self, key: KeyEvent, screen: &mut Screen, profile: &Profile) -> LineOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.done(screen);
                return LineOutcome::Done(None);
            }
            KeyCode::Enter => {
                let submission = self.submission(profile);
                self.done(screen);
                return LineOutcome::Done(submission);
            }
            KeyCode::Backspace => self.delete_previous_character(screen),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.input.len(),
            KeyCode::Char('b') if ctrl => self.move_left(),
            KeyCode::Char('f') if ctrl => self.move_right(),
            KeyCode::Char('a') if ctrl => self.cursor = 0,
            KeyCode::Char('e') if ctrl => self.cursor = self.input.len(),
            KeyCode::Char(ch) if !ctrl => self.insert_character(ch, screen),
            _ => {}
        }
        self.place_cursor(screen);
        LineOutcome::Pending
    }

    fn delete_previous_character(&mut self, screen: &mut Screen) {
        if self.cursor == 0 {
            return;
        }
        self.input.remove(self.cursor - 1);
        // The trailing space erases the old last character.
        let text = format!("{} ", self.input());
        screen.draw_plain(self.prompt_width(), PROMPT_ROW, &text, Style::default());
        self.move_left();
    }

    fn insert_character(&mut self, ch: char, screen: &mut Screen) {
        self.input.insert(self.cursor, ch);
        screen.draw_plain(self.prompt_width(), PROMPT_ROW, &self.input(), Style::default());
        self.move_right();
    }

    fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.len());
    }

    fn prompt_width(&self) -> usize {
        self.prompt.chars().count()
    }

    fn place_cursor(&self, screen: &mut Screen) {
        let x = (self.prompt_width() + self.cursor).min(u16::MAX as usize) as u16;
        screen.set_cursor(Some((x, PROMPT_ROW as u16)));
    }

    fn done(&self, screen: &mut Screen) {
        screen.clear_line(0, PROMPT_ROW);
        screen.set_cursor(None);
    }

    fn submission(&self, profile: &Profile) -> Option<Submission> {
        match self.command {
            LineCommand::AddTickers => {
                let tickers = self.tokenize();
                (!tickers.is_empty()).then_some(Submission::AddTickers(tickers))
            }
            LineCommand::RemoveTickers => {
                let tickers = self.tokenize();
                (!tickers.is_empty()).then_some(Submission::RemoveTickers(tickers))
            }
            LineCommand::SetFilter => {
                let input = self.input();
                let expression = input.trim();
                if !expression.is_empty() {
                    Some(Submission::SetFilter(expression.to_string()))
                } else if profile.filter().is_active() {
                    Some(Submission::SetFilter(profile.filter().source().to_string()))
                } else {
                    Some(Submission::ClearFilter)
                }
            }
        }
    }

    /// Upper-cased symbols split on commas and whitespace.
    fn tokenize(&self) -> Vec<String> {
        self.input()
            .to_uppercase()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}
