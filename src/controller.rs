//! The event loop.
//!
//! One task owns the screen and the profile. It waits on the input channel
//! and three timers, handles whichever is ready, and only pushes deferred
//! quote and market redraws once the input queue is empty, so typing stays
//! responsive while data keeps arriving.

use crate::editor::{ColumnEditor, ColumnOutcome, LineCommand, LineEditor, LineOutcome, Submission};
use crate::profile::Profile;
use crate::provider::history::{HistoryCache, WarmUpOptions};
use crate::provider::{Market, QuoteSource, Quotes};
use crate::screen::{RenderTarget, Screen};
use anyhow::{Context, Result};
use chrono::Local;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::Stdout;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

const HELP: &str = "markettop: live stock quotes and market indices

<u>Command</u>    <u>Description                                </u>
   +       Add stocks to the list.
   -       Remove stocks from the list.
   ?       Display this help screen.
   f       Set filtering expression.
   F       Unset filtering expression.
   g       Group stocks by advancing/declining issues.
   o       Change column sort order.
   p       Pause market data and stock updates.
   t       Show or hide the clock.
  j k      Scroll down and up; PgDn, PgUp, Home and End also work.
   q       Quit.
  esc      Ditto.

Enter comma-delimited list of stock tickers when prompted.
Filter example: <b>changePercent > 1 && ticker =~ '^A'</b>

<r> Press any key to continue </r>
";

enum Mode {
    Normal,
    EditingLine(LineEditor),
    EditingColumn(ColumnEditor),
    ShowingHelp,
}

/// A region's queued redraw and what asked for it. User-driven redraws
/// still go out while paused; timer and background ones wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
enum Pending {
    #[default]
    Idle,
    Tick,
    User,
}

impl Pending {
    fn raise(&mut self, to: Pending) {
        *self = (*self).max(to);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Controller<S: QuoteSource> {
    profile: Profile,
    screen: Screen,
    source: Arc<S>,
    market: Market<S>,
    quotes: Quotes<S>,
    history: Option<Arc<HistoryCache>>,
    warm_up: WarmUpOptions,
    mode: Mode,
    /// Redraws waiting for a quiet input queue
    quotes_dirty: Pending,
    market_dirty: Pending,
    /// Set from background tasks when new data lands
    quotes_updated: Arc<AtomicBool>,
    market_updated: Arc<AtomicBool>,
    /// Stops history warm-up on exit
    cancel: Arc<AtomicBool>,
}

impl<S: QuoteSource> Controller<S> {
    pub fn new(
        source: Arc<S>,
        profile: Profile,
        screen: Screen,
        history: Option<Arc<HistoryCache>>,
        warm_up: WarmUpOptions,
    ) -> Self {
        let quotes_updated = Arc::new(AtomicBool::new(false));
        let market_updated = Arc::new(AtomicBool::new(false));

        let mut market = Market::new(Arc::clone(&source));
        let flag = Arc::clone(&market_updated);
        market.bind_on_update(move || flag.store(true, Ordering::SeqCst));

        let mut quotes = Quotes::new(Arc::clone(&source), history.clone());
        let flag = Arc::clone(&quotes_updated);
        quotes.bind_on_update(move || flag.store(true, Ordering::SeqCst));

        Self {
            profile,
            screen,
            source,
            market,
            quotes,
            history,
            warm_up,
            mode: Mode::Normal,
            quotes_dirty: Pending::User,
            market_dirty: Pending::User,
            quotes_updated,
            market_updated,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run until the user quits or the input channel closes.
    pub async fn run(
        mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
        mut events: UnboundedReceiver<Event>,
    ) -> Result<()> {
        self.market.fetch();
        self.refresh_quotes();
        self.warm_up_history(self.profile.tickers().to_vec());

        let quotes_period = self.profile.quotes_refresh();
        let market_period = self.profile.market_refresh();
        info!(
            quotes = %humantime::format_duration(quotes_period),
            market = %humantime::format_duration(market_period),
            "Starting event loop"
        );

        let mut clock = interval(Duration::from_secs(1));
        let mut quotes_tick = interval_at(Instant::now() + quotes_period, quotes_period);
        let mut market_tick = interval_at(Instant::now() + market_period, market_period);
        for timer in [&mut clock, &mut quotes_tick, &mut market_tick] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                biased;

                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Input channel closed");
                        break;
                    };
                    if self.handle_event(event) == Flow::Quit {
                        break;
                    }
                }
                _ = clock.tick() => self.tick_clock(),
                _ = quotes_tick.tick() => self.refresh_quotes(),
                _ = market_tick.tick() => {
                    self.market.fetch();
                    self.market_dirty.raise(Pending::Tick);
                }
            }

            if events.is_empty() {
                self.flush();
            }
            if self.screen.take_dirty() {
                terminal
                    .draw(|frame| self.screen.render(frame))
                    .context("Failed to draw to terminal")?;
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Err(e) = self.profile.save() {
            warn!(error = %e, "Failed to save profile");
        }
        info!("Shutting down");
    }

    fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Key(key) => return self.handle_key(key),
            Event::Mouse(mouse) if matches!(self.mode, Mode::Normal) => match mouse.kind {
                MouseEventKind::ScrollUp => self.scroll(|screen| screen.decrease_offset(1)),
                MouseEventKind::ScrollDown => self.scroll(|screen| screen.increase_offset(1)),
                _ => {}
            },
            Event::Resize(width, height) => self.resize(width, height),
            _ => {}
        }
        Flow::Continue
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Flow::Quit;
        }

        self.mode = match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => return self.handle_command(key),
            Mode::EditingLine(mut editor) => {
                match editor.handle(key, &mut self.screen, &self.profile) {
                    LineOutcome::Pending => Mode::EditingLine(editor),
                    LineOutcome::Done(submission) => {
                        debug!(command = ?editor.command(), "Line editor closed");
                        if let Some(submission) = submission {
                            self.submit(submission);
                        }
                        Mode::Normal
                    }
                }
            }
            Mode::EditingColumn(mut editor) => {
                match editor.handle(key, &mut self.screen, &mut self.profile) {
                    ColumnOutcome::Pending => Mode::EditingColumn(editor),
                    ColumnOutcome::Reordered => {
                        self.quotes_dirty.raise(Pending::User);
                        Mode::EditingColumn(editor)
                    }
                    ColumnOutcome::Done => {
                        self.quotes_dirty.raise(Pending::User);
                        Mode::Normal
                    }
                }
            }
            Mode::ShowingHelp => {
                self.redraw_all();
                Mode::Normal
            }
        };
        Flow::Continue
    }

    fn handle_command(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => return Flow::Quit,
            KeyCode::Char('+') => self.prompt(LineCommand::AddTickers),
            KeyCode::Char('-') => self.prompt(LineCommand::RemoveTickers),
            KeyCode::Char('f') => self.prompt(LineCommand::SetFilter),
            KeyCode::Char('F') => self.submit(Submission::ClearFilter),
            KeyCode::Char('o') | KeyCode::Char('O') => {
                self.mode = Mode::EditingColumn(ColumnEditor::new(&mut self.screen, &mut self.profile));
            }
            KeyCode::Char('g') | KeyCode::Char('G') => {
                if let Err(e) = self.profile.regroup() {
                    warn!(error = %e, "Failed to save grouping");
                }
                self.quotes_dirty.raise(Pending::User);
            }
            KeyCode::Char('p') | KeyCode::Char('P') => self.toggle_pause(),
            KeyCode::Char('t') | KeyCode::Char('T') => {
                if let Err(e) = self.profile.toggle_timestamp() {
                    warn!(error = %e, "Failed to save timestamp setting");
                }
                self.market_dirty.raise(Pending::User);
            }
            KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Char('H') => self.show_help(),
            KeyCode::Up | KeyCode::Char('k') => self.scroll(|screen| screen.decrease_offset(1)),
            KeyCode::Down | KeyCode::Char('j') => self.scroll(|screen| screen.increase_offset(1)),
            KeyCode::PageUp => self.scroll(|screen| screen.decrease_offset(screen.viewport_rows())),
            KeyCode::PageDown => {
                self.scroll(|screen| screen.increase_offset(screen.viewport_rows()))
            }
            KeyCode::Home => self.scroll(Screen::scroll_top),
            KeyCode::End => self.scroll(Screen::scroll_bottom),
            _ => {}
        }
        Flow::Continue
    }

    fn prompt(&mut self, command: LineCommand) {
        self.mode = Mode::EditingLine(LineEditor::prompt(command, &mut self.screen, &self.profile));
    }

    fn submit(&mut self, submission: Submission) {
        match submission {
            Submission::AddTickers(tickers) => {
                match self.quotes.add_tickers(&mut self.profile, &tickers) {
                    Ok(0) => {}
                    Ok(added) => {
                        info!(added, tickers = ?tickers, "Added tickers");
                        self.quotes_dirty.raise(Pending::User);
                        self.warm_up_history(tickers);
                    }
                    Err(e) => warn!(error = %e, "Failed to add tickers"),
                }
            }
            Submission::RemoveTickers(tickers) => {
                match self.quotes.remove_tickers(&mut self.profile, &tickers) {
                    Ok(removed) => {
                        info!(removed, tickers = ?tickers, "Removed tickers");
                        self.quotes_dirty.raise(Pending::User);
                    }
                    Err(e) => warn!(error = %e, "Failed to remove tickers"),
                }
            }
            Submission::SetFilter(expression) => {
                match self.profile.set_filter(&expression) {
                    Ok(()) => info!(filter = %expression, "Filter set"),
                    Err(e) => warn!(filter = %expression, error = %e, "Rejected filter"),
                }
                self.quotes_dirty.raise(Pending::User);
            }
            Submission::ClearFilter => {
                if let Err(e) = self.profile.set_filter("") {
                    warn!(error = %e, "Failed to clear filter");
                }
                self.quotes_dirty.raise(Pending::User);
            }
        }
    }

    fn scroll(&mut self, change: impl FnOnce(&mut Screen)) {
        let before = self.screen.scroll();
        change(&mut self.screen);
        if self.screen.scroll() != before {
            self.quotes_dirty.raise(Pending::User);
        }
    }

    fn toggle_pause(&mut self) {
        let paused = !self.screen.is_paused();
        self.screen.pause(paused);
        if paused {
            info!("Paused");
            self.screen.draw(&[], &mut self.profile);
        } else {
            info!("Resumed");
            self.redraw_all();
        }
    }

    fn show_help(&mut self) {
        self.mode = Mode::ShowingHelp;
        self.draw_help();
    }

    fn draw_help(&mut self) {
        self.screen.clear();
        self.screen.draw(&[RenderTarget::Text(HELP)], &mut self.profile);
    }

    /// Wipe the surface and queue both regions.
    fn redraw_all(&mut self) {
        self.screen.invalidate();
        self.quotes_dirty.raise(Pending::User);
        self.market_dirty.raise(Pending::User);
    }

    fn resize(&mut self, width: u16, height: u16) {
        debug!(width, height, "Terminal resized");
        self.screen.resize(width, height);
        self.quotes_dirty.raise(Pending::User);
        self.market_dirty.raise(Pending::User);
        if matches!(self.mode, Mode::ShowingHelp) {
            self.draw_help();
        }
    }

    fn refresh_quotes(&mut self) {
        self.quotes.fetch(self.profile.tickers().to_vec());
        self.quotes_dirty.raise(Pending::Tick);
    }

    fn tick_clock(&mut self) {
        if self.is_frozen() || !self.profile.show_timestamp() {
            return;
        }
        self.screen
            .draw(&[RenderTarget::Timestamp(Local::now())], &mut self.profile);
    }

    /// The lowest origin that may draw right now, or `None` when the display
    /// is held entirely. Pause holds timer redraws; help holds everything.
    fn draw_threshold(&self) -> Option<Pending> {
        match self.mode {
            Mode::ShowingHelp => None,
            _ if self.screen.is_paused() => Some(Pending::User),
            _ => Some(Pending::Tick),
        }
    }

    fn is_frozen(&self) -> bool {
        self.draw_threshold() != Some(Pending::Tick)
    }

    /// Draw whatever is pending and allowed.
    fn flush(&mut self) {
        if self.quotes_updated.swap(false, Ordering::SeqCst) {
            self.quotes_dirty.raise(Pending::Tick);
        }
        if self.market_updated.swap(false, Ordering::SeqCst) {
            self.market_dirty.raise(Pending::Tick);
        }
        let Some(threshold) = self.draw_threshold() else {
            return;
        };
        let draw_market = self.market_dirty >= threshold;
        let draw_quotes = self.quotes_dirty >= threshold;
        if !(draw_market || draw_quotes) {
            return;
        }

        let market = draw_market.then(|| self.market.snapshot());
        let quotes = draw_quotes.then(|| self.quotes.snapshot());
        if draw_market {
            self.market_dirty = Pending::Idle;
        }
        if draw_quotes {
            self.quotes_dirty = Pending::Idle;
        }

        let mut targets = Vec::with_capacity(2);
        if let Some(market) = &market {
            targets.push(RenderTarget::Market(market));
        }
        if let Some(quotes) = &quotes {
            targets.push(RenderTarget::Quotes(quotes));
        }
        if self.screen.draw(&targets, &mut self.profile) {
            // The filter failed and was dropped; show everything next time.
            self.quotes_dirty.raise(Pending::User);
        }
        if let Mode::EditingLine(editor) = &self.mode {
            editor.redraw(&mut self.screen);
        }
    }

    fn warm_up_history(&self, tickers: Vec<String>) {
        let Some(history) = &self.history else {
            return;
        };
        let updated = Arc::clone(&self.quotes_updated);
        tokio::spawn(Arc::clone(history).warm_up(
            Arc::clone(&self.source),
            tickers,
            self.warm_up,
            Arc::clone(&self.cancel),
            move |ticker: &str| {
                debug!(ticker, "History updated");
                updated.store(true, Ordering::SeqCst);
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{HEADER_ROW, PROMPT_ROW};
    use crate::markup::Markup;
    use crate::models::DailyRecord;
    use crate::profile::testing::profile;
    use crate::provider::testing::FakeSource;
    use crossterm::event::{MouseEvent, MouseEventKind};
    use std::collections::BTreeMap;

    fn controller_with(source: FakeSource, history: Option<Arc<HistoryCache>>) -> Controller<FakeSource> {
        let screen = Screen::new(250, 12, Markup::new(&BTreeMap::new()).unwrap()).unwrap();
        let options = WarmUpOptions {
            request_delay: Duration::ZERO,
            ..WarmUpOptions::default()
        };
        Controller::new(Arc::new(source), profile(), screen, history, options)
    }

    fn controller() -> Controller<FakeSource> {
        controller_with(FakeSource::default(), None)
    }

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(c: &mut Controller<FakeSource>, text: &str) {
        for ch in text.chars() {
            assert_eq!(c.handle_event(key(KeyCode::Char(ch))), Flow::Continue);
        }
    }

    /// Row index holding `ticker` below the header, if drawn.
    fn row_of(c: &Controller<FakeSource>, ticker: &str) -> Option<u16> {
        (HEADER_ROW as u16 + 1..c.screen.height())
            .find(|&y| c.screen.row_text(y).trim_start().starts_with(ticker))
    }

    async fn load_quotes(c: &mut Controller<FakeSource>) {
        c.quotes.fetch(c.profile.tickers().to_vec()).await.unwrap();
        c.market.fetch().await.unwrap();
        c.flush();
    }

    #[test]
    fn test_quit_keys() {
        for code in [KeyCode::Char('q'), KeyCode::Char('Q'), KeyCode::Esc] {
            assert_eq!(controller().handle_event(key(code)), Flow::Quit);
        }
        let ctrl_c = Event::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert_eq!(controller().handle_event(ctrl_c), Flow::Quit);
    }

    #[tokio::test]
    async fn test_flush_draws_market_and_quotes() {
        let mut c = controller();
        load_quotes(&mut c).await;
        assert!(c.screen.row_text(0).contains("Dow"));
        assert!(c.screen.row_text(HEADER_ROW as u16).contains("Ticker"));
        assert!(row_of(&c, "AAPL").is_some());
        assert_eq!((c.quotes_dirty, c.market_dirty), (Pending::Idle, Pending::Idle));
    }

    #[tokio::test]
    async fn test_escape_in_editor_does_not_quit() {
        let mut c = controller();
        c.handle_event(key(KeyCode::Char('+')));
        assert!(matches!(c.mode, Mode::EditingLine(_)));
        assert_eq!(c.handle_event(key(KeyCode::Esc)), Flow::Continue);
        assert!(matches!(c.mode, Mode::Normal));
    }

    #[tokio::test]
    async fn test_add_tickers_through_prompt() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('+')));
        assert!(c.screen.row_text(PROMPT_ROW as u16).starts_with("Add tickers: "));
        type_text(&mut c, "tsla");
        c.handle_event(key(KeyCode::Enter));

        assert!(matches!(c.mode, Mode::Normal));
        assert!(c.profile.tickers().contains(&"TSLA".to_string()));
        assert_eq!(c.quotes_dirty, Pending::User);
    }

    #[tokio::test]
    async fn test_remove_tickers_redraws_shorter_grid() {
        let mut c = controller();
        load_quotes(&mut c).await;
        let last = row_of(&c, "V").unwrap();

        c.handle_event(key(KeyCode::Char('-')));
        type_text(&mut c, "V");
        c.handle_event(key(KeyCode::Enter));
        c.flush();

        assert!(!c.profile.tickers().contains(&"V".to_string()));
        assert!(row_of(&c, "V").is_none());
        assert_eq!(c.screen.row_text(last).trim(), "");
    }

    #[tokio::test]
    async fn test_filter_and_clear() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('f')));
        type_text(&mut c, "ticker == 'IBM'");
        c.handle_event(key(KeyCode::Enter));
        c.flush();
        assert_eq!(c.profile.filter().source(), "ticker == 'IBM'");
        assert!(row_of(&c, "IBM").is_some());
        assert!(row_of(&c, "AAPL").is_none());

        c.handle_event(key(KeyCode::Char('F')));
        c.flush();
        assert!(!c.profile.filter().is_active());
        assert!(row_of(&c, "AAPL").is_some());
    }

    #[tokio::test]
    async fn test_failing_filter_falls_back_to_unfiltered() {
        let mut c = controller();
        load_quotes(&mut c).await;

        // Compiles, but evaluates to a number rather than a boolean.
        c.submit(Submission::SetFilter("last + 1".into()));
        c.flush();
        assert!(!c.profile.filter().is_active());
        assert_eq!(c.quotes_dirty, Pending::User);

        c.flush();
        assert!(row_of(&c, "AAPL").is_some());
    }

    #[tokio::test]
    async fn test_column_editor_round_trip() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('o')));
        assert!(matches!(c.mode, Mode::EditingColumn(_)));
        c.handle_event(key(KeyCode::Right));
        c.handle_event(key(KeyCode::Enter));
        assert_eq!(c.profile.sort_column(), 1);
        assert_eq!(c.quotes_dirty, Pending::User);

        c.handle_event(key(KeyCode::Esc));
        assert!(matches!(c.mode, Mode::Normal));
        assert_eq!(c.profile.selected_column(), None);
    }

    #[tokio::test]
    async fn test_help_overlay_and_dismiss() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('?')));
        assert!(matches!(c.mode, Mode::ShowingHelp));
        assert!((0..c.screen.height()).any(|y| c.screen.row_text(y).contains("Add stocks")));

        // Data updates do not draw over the help screen.
        c.quotes_dirty.raise(Pending::Tick);
        c.flush();
        assert_eq!(c.quotes_dirty, Pending::Tick);

        c.handle_event(key(KeyCode::Char('x')));
        assert!(matches!(c.mode, Mode::Normal));
        c.flush();
        assert!(row_of(&c, "AAPL").is_some());
        assert!(!(0..c.screen.height()).any(|y| c.screen.row_text(y).contains("Add stocks")));
    }

    #[tokio::test]
    async fn test_pause_holds_display_until_resumed() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('p')));
        assert!(c.screen.is_paused());
        assert!(c.screen.row_text(0).contains("Paused since"));

        c.market_updated.store(true, Ordering::SeqCst);
        c.flush();
        assert_eq!(c.market_dirty, Pending::Tick);

        c.handle_event(key(KeyCode::Char('P')));
        assert!(!c.screen.is_paused());
        c.flush();
        assert!(!c.screen.row_text(0).contains("Paused since"));
        assert_eq!(c.market_dirty, Pending::Idle);
    }

    #[tokio::test]
    async fn test_user_changes_draw_while_paused() {
        let mut c = controller();
        load_quotes(&mut c).await;
        assert_eq!(row_of(&c, "AAPL"), Some(HEADER_ROW as u16 + 1));

        c.handle_event(key(KeyCode::Char('p')));
        c.market_updated.store(true, Ordering::SeqCst);
        for code in [KeyCode::Char('o'), KeyCode::Enter, KeyCode::Esc] {
            c.handle_event(key(code));
        }
        assert!(!c.profile.is_ascending());
        c.flush();

        assert_eq!(row_of(&c, "V"), Some(HEADER_ROW as u16 + 1));
        assert!(c.screen.row_text(0).contains("Paused since"));
        // The market tick still waits for the pause to end.
        assert_eq!(c.market_dirty, Pending::Tick);
        assert_eq!(c.quotes_dirty, Pending::Idle);
    }

    #[tokio::test]
    async fn test_resize_keeps_open_prompt() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('+')));
        type_text(&mut c, "ms");
        c.handle_event(Event::Resize(200, 14));
        c.flush();

        assert!(matches!(c.mode, Mode::EditingLine(_)));
        assert!(c.screen.row_text(PROMPT_ROW as u16).starts_with("Add tickers: ms"));
        assert_eq!(c.screen.cursor(), Some((15, PROMPT_ROW as u16)));
        assert!(row_of(&c, "AAPL").is_some());
    }

    #[tokio::test]
    async fn test_grouping_and_timestamp_toggles() {
        let mut c = controller();
        load_quotes(&mut c).await;

        c.handle_event(key(KeyCode::Char('g')));
        assert!(c.profile.is_grouped());
        assert_eq!(c.quotes_dirty, Pending::User);

        c.handle_event(key(KeyCode::Char('t')));
        assert!(c.profile.show_timestamp());
        c.flush();
        c.tick_clock();
        assert!(c.screen.row_text(0).trim_end().ends_with('m'));
    }

    #[tokio::test]
    async fn test_scrolling_marks_quotes_dirty() {
        let mut c = controller();
        load_quotes(&mut c).await;
        // 12 rows leave 7 for data; seven tickers fit, so nothing scrolls.
        c.handle_event(key(KeyCode::Char('j')));
        assert_eq!(c.quotes_dirty, Pending::Idle);

        c.submit(Submission::AddTickers(vec!["MSFT".into(), "TSLA".into(), "NVDA".into()]));
        c.quotes.fetch(c.profile.tickers().to_vec()).await.unwrap();
        c.flush();
        assert_eq!(c.screen.scroll().max(), 3);

        c.handle_event(key(KeyCode::End));
        assert_eq!(c.screen.scroll().offset(), 3);
        assert_eq!(c.quotes_dirty, Pending::User);

        c.handle_event(Event::Mouse(MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        }));
        assert_eq!(c.screen.scroll().offset(), 2);

        c.handle_event(key(KeyCode::Home));
        assert_eq!(c.screen.scroll().offset(), 0);
    }

    #[tokio::test]
    async fn test_resize_queues_both_regions() {
        let mut c = controller();
        load_quotes(&mut c).await;
        c.handle_event(Event::Resize(120, 30));
        assert_eq!(c.screen.width(), 120);
        assert_eq!((c.quotes_dirty, c.market_dirty), (Pending::User, Pending::User));
    }

    #[tokio::test]
    async fn test_new_tickers_warm_history() {
        let record = DailyRecord {
            date: Local::now().date_naive(),
            high: 12.0,
            low: 10.0,
            volume: 1000.0,
        };
        let source = FakeSource {
            history: vec![record],
            ..FakeSource::default()
        };
        let history = Arc::new(HistoryCache::new());
        let mut c = controller_with(source, Some(Arc::clone(&history)));

        c.submit(Submission::AddTickers(vec!["TSLA".into()]));
        for _ in 0..100 {
            if c.quotes_updated.load(Ordering::SeqCst) && history.get("TSLA").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(history.get("TSLA").map(|e| e.high52), Some("12.00".to_string()));
        assert!(c.source.history_calls.load(Ordering::SeqCst) >= 1);
    }
}
