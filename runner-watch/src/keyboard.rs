//! Raw-mode keyboard input.

use anyhow::{Context, Result};
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::input::{InputSource, WatchInput};

/// Puts the terminal in raw mode and forwards key presses as raw bytes.
///
/// Dropping the source stops the reader and restores the terminal.
#[derive(Default)]
pub struct KeySource {
    reader: Option<JoinHandle<()>>,
    raw_mode: bool,
}

impl KeySource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InputSource for KeySource {
    fn start(&mut self, inputs: mpsc::Sender<WatchInput>) -> Result<()> {
        terminal::enable_raw_mode().context("enable raw terminal mode")?;
        self.raw_mode = true;
        self.reader = Some(tokio::spawn(read_keys(inputs)));
        debug!("keyboard input attached");
        Ok(())
    }
}

impl Drop for KeySource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if self.raw_mode
            && let Err(err) = terminal::disable_raw_mode()
        {
            warn!(error = %err, "failed to restore terminal mode");
        }
    }
}

async fn read_keys(inputs: mpsc::Sender<WatchInput>) {
    let mut events = EventStream::new();
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Key(key)) => {
                if let Some(byte) = key_byte(key)
                    && inputs.send(WatchInput::Key(byte)).await.is_err()
                {
                    return;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "terminal event read failed");
                break;
            }
        }
    }
    debug!("keyboard input closed");
}

/// The byte a raw-mode terminal would have produced for `key`.
fn key_byte(key: KeyEvent) -> Option<u8> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Enter => Some(b'\r'),
        KeyCode::Esc => Some(0x1b),
        KeyCode::Char(c) if key.modifiers.contains(KeyModifiers::CONTROL) => {
            // ctrl-a is 0x01 through ctrl-z at 0x1a
            c.is_ascii_alphabetic()
                .then(|| c.to_ascii_lowercase() as u8 - b'a' + 1)
        }
        KeyCode::Char(c) if c.is_ascii() => Some(c as u8),
        _ => None,
    }
}
