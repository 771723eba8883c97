//! Column picker for the sort order.
//!
//! Highlights the current sort column in the header. Left/Right move the
//! highlight (wrapping at either end), Enter sorts by the highlighted column
//! or flips the direction if it already is the sort column, Esc exits.

use crate::profile::Profile;
use crate::screen::Screen;
use crossterm::event::{KeyCode, KeyEvent};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOutcome {
    Pending,
    /// Sort order changed; the quotes need a redraw
    Reordered,
    Done,
}

#[derive(Debug)]
pub struct ColumnEditor {
    total: usize,
}

impl ColumnEditor {
    pub fn new(screen: &mut Screen, profile: &mut Profile) -> Self {
        let total = screen.total_columns().max(1);
        profile.select_column(Some(profile.sort_column().min(total.saturating_sub(1))));
        screen.redraw_header(profile);
        Self { total }
    }

    pub fn handle(&mut self, key: KeyEvent, screen: &mut Screen, profile: &mut Profile) -> ColumnOutcome {
        let selected = profile.selected_column().unwrap_or(0);
        let outcome = match key.code {
            KeyCode::Esc => {
                profile.select_column(None);
                ColumnOutcome::Done
            }
            KeyCode::Enter => {
                if let Err(e) = profile.reorder() {
                    warn!(error = %e, "Failed to save sort order");
                }
                ColumnOutcome::Reordered
            }
            KeyCode::Left => {
                let column = if selected == 0 { self.total - 1 } else { selected - 1 };
                profile.select_column(Some(column));
                ColumnOutcome::Pending
            }
            KeyCode::Right => {
                profile.select_column(Some((selected + 1) % self.total));
                ColumnOutcome::Pending
            }
            _ => ColumnOutcome::Pending,
        };
        screen.redraw_header(profile);
        outcome
    }
}
