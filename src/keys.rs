//! Matching decoded key presses against a command's key sequence.

/// Progress of the keys typed so far against the expected sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchProgress {
    Partial,
    Complete,
    Mismatch,
}

/// Split a binding like `"ctrl+w v"` or `"ciw"` into individual presses.
///
/// Chords (`ctrl+w`) and named keys (`esc`, `enter`) stay whole; any other
/// multi-character token is a run of single keys.
pub fn parse_sequence(keys: &str) -> Vec<String> {
    keys.split_whitespace()
        .flat_map(|token| {
            if (token.contains('+') && token.len() > 1) || is_named_key(token) {
                vec![token.to_lowercase()]
            } else {
                token.chars().map(|c| c.to_string()).collect()
            }
        })
        .collect()
}

fn is_named_key(token: &str) -> bool {
    matches!(
        token.to_lowercase().as_str(),
        "esc" | "enter" | "tab" | "backspace" | "space" | "up" | "down" | "left" | "right"
    )
}

#[derive(Debug, Clone)]
pub struct KeyBuffer {
    expected: Vec<String>,
    typed: Vec<String>,
}

impl KeyBuffer {
    pub fn new(keys: &str) -> Self {
        Self {
            expected: parse_sequence(keys),
            typed: Vec::new(),
        }
    }

    pub fn push(&mut self, key: &str) -> MatchProgress {
        let idx = self.typed.len();
        self.typed.push(key.to_string());

        match self.expected.get(idx) {
            Some(expected) if expected == key => {
                if self.typed.len() == self.expected.len() {
                    MatchProgress::Complete
                } else {
                    MatchProgress::Partial
                }
            }
            _ => MatchProgress::Mismatch,
        }
    }

    pub fn typed(&self) -> &[String] {
        &self.typed
    }

    pub fn expected(&self) -> &[String] {
        &self.expected
    }

    pub fn clear(&mut self) {
        self.typed.clear();
    }
}
