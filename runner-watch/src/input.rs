//! Inputs delivered to the watch actor and the sources producing them.

use std::path::PathBuf;

use anyhow::Result;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    /// A file under the root was created or modified.
    Changed(PathBuf),
    Removed(PathBuf),
    /// The configuration file changed or disappeared.
    ConfigChanged,
    /// One raw byte read from the terminal.
    Key(u8),
    /// Stop watching without a cancellation reason.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    RunAll,
    Quit,
}

const CTRL_C: u8 = 0x03;
const CTRL_D: u8 = 0x04;
const ESCAPE: u8 = 0x1b;

/// Map a raw terminal byte to a watch command.
pub fn key_action(byte: u8) -> Option<KeyAction> {
    match byte {
        b'\r' | b'\n' | b' ' | b'a' | b'A' => Some(KeyAction::RunAll),
        CTRL_C | CTRL_D | ESCAPE | b'q' | b'Q' | b'x' | b'X' => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Producer of watch inputs, owned by the watch actor.
///
/// `start` is called once before the actor runs. Dropping the source stops
/// it and releases whatever it holds.
pub trait InputSource: Send {
    fn start(&mut self, inputs: mpsc::Sender<WatchInput>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_all_and_quit_keys() {
        for byte in [b'\r', b'\n', b' ', b'a'] {
            assert_eq!(key_action(byte), Some(KeyAction::RunAll), "byte {byte:#x}");
        }
        for byte in [0x03, 0x04, 0x1b, b'q', b'x'] {
            assert_eq!(key_action(byte), Some(KeyAction::Quit), "byte {byte:#x}");
        }
        assert_eq!(key_action(b'z'), None);
    }
}
