//! Off-screen surface the dashboard draws into.
//!
//! Everything is drawn as markup text into a persistent [`Buffer`]; each
//! frame copies that buffer to the terminal. The quotes grid is redrawn
//! differentially: rows are overwritten in place, scrolled rows are skipped,
//! and rows left over from a longer previous frame are blanked.

use crate::layout::{HEADER_ROW, Layout, clock};
use crate::markup::Markup;
use crate::profile::Profile;
use crate::provider::{MarketSnapshot, QuotesSnapshot};
use anyhow::Result;
use chrono::{DateTime, Local};
use ratatui::Frame;
use ratatui::buffer::Buffer;
use ratatui::layout::{Position, Rect};
use ratatui::style::Style;

/// Something to draw on the next `Screen::draw` call.
#[derive(Debug, Clone, Copy)]
pub enum RenderTarget<'a> {
    Market(&'a MarketSnapshot),
    Quotes(&'a QuotesSnapshot),
    Timestamp(DateTime<Local>),
    /// Free-form markup, drawn from the top-left
    Text(&'a str),
}

/// Vertical scroll position of the quotes grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollState {
    offset: usize,
    max: usize,
}

impl ScrollState {
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[cfg(test)]
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn set_max(&mut self, max: usize) {
        self.max = max;
        self.offset = self.offset.min(max);
    }

    pub fn increase(&mut self, rows: usize) {
        self.offset = self.offset.saturating_add(rows).min(self.max);
    }

    pub fn decrease(&mut self, rows: usize) {
        self.offset = self.offset.saturating_sub(rows);
    }

    pub fn top(&mut self) {
        self.offset = 0;
    }

    pub fn bottom(&mut self) {
        if self.max > 0 {
            self.offset = self.max;
        }
    }
}

pub struct Screen {
    width: u16,
    height: u16,
    surface: Buffer,
    markup: Markup,
    layout: Layout,
    /// False until the next draw wipes the whole surface
    cleared: bool,
    paused_at: Option<DateTime<Local>>,
    scroll: ScrollState,
    /// Last grid row drawn by the previous quotes draw
    last_grid_row: Option<usize>,
    cursor: Option<(u16, u16)>,
    dirty: bool,
}

impl Screen {
    pub fn new(width: u16, height: u16, markup: Markup) -> Result<Self> {
        Ok(Self {
            width,
            height,
            surface: Buffer::empty(Rect::new(0, 0, width, height)),
            markup,
            layout: Layout::new()?,
            cleared: false,
            paused_at: None,
            scroll: ScrollState::default(),
            last_grid_row: None,
            cursor: None,
            dirty: true,
        })
    }

    #[cfg(test)]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[cfg(test)]
    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn total_columns(&self) -> usize {
        self.layout.total_columns()
    }

    /// Rows of the grid visible below the header.
    pub fn viewport_rows(&self) -> usize {
        (self.height as usize).saturating_sub(HEADER_ROW + 1)
    }

    pub fn scroll(&self) -> ScrollState {
        self.scroll
    }

    pub fn increase_offset(&mut self, rows: usize) {
        self.scroll.increase(rows);
    }

    pub fn decrease_offset(&mut self, rows: usize) {
        self.scroll.decrease(rows);
    }

    pub fn scroll_top(&mut self) {
        self.scroll.top();
    }

    pub fn scroll_bottom(&mut self) {
        self.scroll.bottom();
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Freeze or resume; the overlay remembers when the pause began.
    pub fn pause(&mut self, paused: bool) {
        self.paused_at = if paused { Some(Local::now()) } else { None };
        self.dirty = true;
    }

    /// New terminal size. Everything is redrawn from scratch afterwards.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.surface = Buffer::empty(Rect::new(0, 0, width, height));
        self.invalidate();
    }

    /// Force a full wipe before the next draw.
    pub fn invalidate(&mut self) {
        self.cleared = false;
        self.last_grid_row = None;
        self.dirty = true;
    }

    pub fn clear(&mut self) {
        self.surface.reset();
        self.cleared = true;
        self.last_grid_row = None;
        self.dirty = true;
    }

    pub fn set_cursor(&mut self, cursor: Option<(u16, u16)>) {
        self.cursor = cursor;
        self.dirty = true;
    }

    /// True once after anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// Draw each target in order. Returns true if a failing filter was
    /// cleared while rendering quotes.
    pub fn draw(&mut self, targets: &[RenderTarget<'_>], profile: &mut Profile) -> bool {
        let mut filter_reset = false;
        for target in targets {
            match *target {
                RenderTarget::Market(snapshot) => {
                    self.ensure_cleared();
                    let text = self.layout.render_market(snapshot);
                    for row in 0..HEADER_ROW - 1 {
                        self.clear_line(0, row);
                    }
                    self.draw_text(&text);
                    if profile.show_timestamp() {
                        self.draw_timestamp(Local::now());
                    }
                }
                RenderTarget::Quotes(snapshot) => {
                    self.ensure_cleared();
                    let view = self.layout.render_quotes(snapshot, profile, Local::now());
                    filter_reset |= view.filter_reset;
                    self.draw_grid(&view.text, view.header_line);
                }
                RenderTarget::Timestamp(now) => self.draw_timestamp(now),
                RenderTarget::Text(text) => {
                    self.ensure_cleared();
                    self.draw_text(text);
                }
            }
        }
        self.draw_pause_overlay();
        filter_reset
    }

    /// Redraw only the column header, e.g. while the column editor moves.
    pub fn redraw_header(&mut self, profile: &Profile) {
        let header = self.layout.header(profile);
        self.clear_line(0, HEADER_ROW);
        self.draw_line(0, HEADER_ROW, &header);
    }

    fn ensure_cleared(&mut self) {
        if !self.cleared {
            self.clear();
        }
    }

    fn draw_text(&mut self, text: &str) {
        for (row, line) in text.split('\n').enumerate() {
            self.draw_line(0, row, line);
        }
    }

    fn draw_timestamp(&mut self, now: DateTime<Local>) {
        if self.paused_at.is_some() {
            return;
        }
        // Fixed width so a shorter time overwrites a longer one.
        self.draw_line(0, 0, &format!("<right><white>{:>10}</></right>", clock(now)));
    }

    fn draw_pause_overlay(&mut self) {
        if let Some(since) = self.paused_at {
            let text = format!("<right><r>Paused since {}</r></right>", clock(since));
            self.draw_line(0, 0, &text);
        }
    }

    /// Lines above the header are drawn in place; the header and every
    /// visible data row are cleared and redrawn.
    fn draw_grid(&mut self, text: &str, header_line: usize) {
        let lines: Vec<&str> = text.split('\n').collect();
        let data_rows = lines.len().saturating_sub(header_line + 1);
        self.scroll
            .set_max(data_rows.saturating_sub(self.viewport_rows()));
        let offset = self.scroll.offset();
        let height = self.height as usize;
        let mut last_drawn = None;

        for (row, line) in lines.iter().enumerate() {
            if row < header_line {
                self.draw_line(0, row, line);
                continue;
            }
            if row > header_line && row - header_line - 1 < offset {
                continue;
            }
            let y = if row == header_line { row } else { row - offset };
            if y >= height {
                break;
            }
            self.clear_line(0, y);
            self.draw_line(0, y, line);
            last_drawn = Some(y);
        }

        let last = last_drawn.unwrap_or(header_line);
        if self.last_grid_row.is_some_and(|previous| previous > last) {
            for y in last + 1..height {
                self.clear_line(0, y);
            }
        }
        self.last_grid_row = Some(last);
    }

    /// Draw one line of markup starting at column `x`.
    ///
    /// Right-aligned runs end at the right edge regardless of `x`. Text past
    /// the edge is dropped.
    pub fn draw_line(&mut self, x: usize, y: usize, text: &str) {
        if y >= self.height as usize {
            return;
        }
        let width = self.width as usize;
        let mut column = x;

        self.markup.reset();
        for token in self.markup.tokenize(text) {
            if self.markup.is_tag(token) {
                continue;
            }
            let style = self.markup.state().style();
            let right_aligned = self.markup.state().right_aligned;
            let len = token.chars().count();

            for (i, ch) in token.chars().enumerate() {
                let position = if right_aligned {
                    match (width + i).checked_sub(len) {
                        Some(p) => p,
                        None => continue,
                    }
                } else {
                    column += 1;
                    column - 1
                };
                self.put(position, y, ch, style);
            }
        }
        self.dirty = true;
    }

    /// Draw text without interpreting tags, e.g. user input.
    pub fn draw_plain(&mut self, x: usize, y: usize, text: &str, style: Style) {
        if y >= self.height as usize {
            return;
        }
        for (i, ch) in text.chars().enumerate() {
            self.put(x + i, y, ch, style);
        }
        self.dirty = true;
    }

    /// Blank from column `x` to the right edge.
    pub fn clear_line(&mut self, x: usize, y: usize) {
        if y >= self.height as usize {
            return;
        }
        for column in x..self.width as usize {
            self.put(column, y, ' ', Style::default());
        }
        self.dirty = true;
    }

    fn put(&mut self, x: usize, y: usize, ch: char, style: Style) {
        if x >= self.width as usize || y >= self.height as usize {
            return;
        }
        if let Some(cell) = self.surface.cell_mut(Position::new(x as u16, y as u16)) {
            cell.reset();
            cell.set_char(ch);
            cell.set_style(style);
        }
    }

    /// Copy the surface into the frame and place the cursor.
    pub fn render(&self, frame: &mut Frame<'_>) {
        let area = frame.area().intersection(self.surface.area);
        let buffer = frame.buffer_mut();
        for y in area.top()..area.bottom() {
            for x in area.left()..area.right() {
                let position = Position::new(x, y);
                if let (Some(source), Some(target)) =
                    (self.surface.cell(position), buffer.cell_mut(position))
                {
                    *target = source.clone();
                }
            }
        }
        if let Some((x, y)) = self.cursor {
            frame.set_cursor_position(Position::new(x, y));
        }
    }

    #[cfg(test)]
    pub fn row_text(&self, y: u16) -> String {
        (0..self.width)
            .filter_map(|x| self.surface.cell(Position::new(x, y)))
            .map(|cell| cell.symbol())
            .collect()
    }

    #[cfg(test)]
    pub fn cell_style(&self, x: u16, y: u16) -> Option<Style> {
        self.surface.cell(Position::new(x, y)).map(|c| c.style())
    }

    #[cfg(test)]
    pub fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }
}
