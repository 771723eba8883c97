//! Terminal input reader.
//!
//! crossterm's `read` blocks, so it runs on its own thread and forwards
//! events over an unbounded channel. Keys pressed while the loop is busy
//! queue up instead of being dropped.

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEventKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// How long each poll waits before checking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the reader thread; dropping it stops the thread.
pub struct InputReader {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl InputReader {
    pub fn spawn() -> Result<(Self, UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("markettop-input".to_string())
            .spawn(move || read_loop(tx, flag))
            .context("Failed to spawn input thread")?;

        Ok((
            Self {
                shutdown,
                handle: Some(handle),
            },
            rx,
        ))
    }
}

impl Drop for InputReader {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_loop(tx: UnboundedSender<Event>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        match event::poll(POLL_INTERVAL) {
            Ok(true) => match event::read() {
                // Release and repeat events would double every keystroke on
                // terminals that report them.
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Press => {}
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read terminal event");
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Failed to poll terminal events");
                break;
            }
        }
    }
    debug!("Input thread stopped");
}
