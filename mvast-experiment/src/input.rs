use mvast_core::TaskError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Keystroke that starts a run in manual mode.
pub const START_KEY: char = ' ';

/// Keystroke that cancels the run from any state.
pub const CANCEL_KEY: char = '\u{1b}';

/// Non-blocking symbol stream (keyboard or serial).
///
/// `read_pending_symbol` must return immediately; `Ok(None)` means nothing is pending.
pub trait SymbolSource {
    fn read_pending_symbol(&mut self) -> Result<Option<char>, TaskError>;
}

/// Case-insensitive match used by both trigger channels.
pub fn matches_symbol(received: char, expected: char) -> bool {
    received == expected || received.to_lowercase().eq(expected.to_lowercase())
}

/// Keystrokes queued by the window and drained once per tick.
///
/// Clones share the queue, so the window layer pushes into one handle while the
/// sequencer drains another.
#[derive(Debug, Clone, Default)]
pub struct KeyboardQueue {
    keys: Rc<RefCell<VecDeque<char>>>,
}

impl KeyboardQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: char) {
        self.keys.borrow_mut().push_back(key);
    }

    pub fn push_str(&self, text: &str) {
        self.keys.borrow_mut().extend(text.chars());
    }

    /// Everything that arrived since the last drain, oldest first.
    pub fn drain(&self) -> Vec<char> {
        self.keys.borrow_mut().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.borrow().is_empty()
    }
}

impl SymbolSource for KeyboardQueue {
    fn read_pending_symbol(&mut self) -> Result<Option<char>, TaskError> {
        Ok(self.keys.borrow_mut().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_queue() {
        let window_side = KeyboardQueue::new();
        let mut loop_side = window_side.clone();
        window_side.push_str("ab");
        assert_eq!(loop_side.read_pending_symbol().unwrap(), Some('a'));
        assert_eq!(loop_side.drain(), vec!['b']);
        assert!(window_side.is_empty());
        assert_eq!(loop_side.read_pending_symbol().unwrap(), None);
    }

    #[test]
    fn symbol_match_ignores_case() {
        assert!(matches_symbol('T', 't'));
        assert!(matches_symbol('=', '='));
        assert!(!matches_symbol('5', 't'));
    }
}
