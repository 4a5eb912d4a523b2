use crate::shell::commands;

const MAX_LINE_LENGTH: usize = 4096;

const MAX_HISTORY: usize = 100;

/// Known wpm subcommands for tab completion
const WPM_SUBCOMMANDS: &[&str] = &["install", "list", "remove", "search", "update", "upgrade"];

/// ANSI escape sequence parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EscapeState {
    /// Normal input mode
    Normal,
    /// Received ESC byte, waiting for '[' or other
    GotEsc,
    /// Received ESC+[, waiting for final byte (CSI sequence)
    GotCsi,
}

/// Outcome of feeding one byte to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// Enter was pressed (or Ctrl-C cancelled the line, yielding an empty one).
    Line(String),
    /// Ctrl-D on an empty line.
    Eof,
}

/// Interactive line editing: echo, special characters, tab-completion, history
pub struct LineEditor {
    /// Current input line buffer
    line_buffer: Vec<u8>,
    /// Cursor position within the line buffer
    cursor_pos: usize,
    /// Command history (oldest first)
    history: Vec<String>,
    /// Current position in history during navigation (None = not navigating)
    history_index: Option<usize>,
    /// Saved line buffer before history navigation started
    saved_line: Vec<u8>,
    esc_state: EscapeState,
    /// The previous byte was CR, so a following LF belongs to the same Enter.
    after_cr: bool,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self {
            line_buffer: Vec::new(),
            cursor_pos: 0,
            history: Vec::new(),
            history_index: None,
            saved_line: Vec::new(),
            esc_state: EscapeState::Normal,
            after_cr: false,
        }
    }
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a byte of input, returns (echo_bytes, event)
    pub fn process_byte(&mut self, byte: u8) -> (Vec<u8>, Option<LineEvent>) {
        let after_cr = std::mem::replace(&mut self.after_cr, byte == b'\r');

        if self.esc_state == EscapeState::GotEsc {
            self.esc_state = EscapeState::Normal;
            if byte == b'[' {
                self.esc_state = EscapeState::GotCsi;
            }
            return (Vec::new(), None);
        }
        if self.esc_state == EscapeState::GotCsi {
            self.esc_state = EscapeState::Normal;
            return match byte {
                b'A' => (self.history_prev(), None),
                b'B' => (self.history_next(), None),
                b'C' => {
                    if self.cursor_pos < self.line_buffer.len() {
                        self.cursor_pos += 1;
                        (b"\x1b[C".to_vec(), None)
                    } else {
                        (Vec::new(), None)
                    }
                }
                b'D' => {
                    if self.cursor_pos > 0 {
                        self.cursor_pos -= 1;
                        (b"\x1b[D".to_vec(), None)
                    } else {
                        (Vec::new(), None)
                    }
                }
                _ => (Vec::new(), None),
            };
        }

        match byte {
            b'\n' if after_cr => (Vec::new(), None),
            b'\r' | b'\n' => {
                let line = self.take_line();
                if !line.trim().is_empty() && self.history.last() != Some(&line) {
                    self.history.push(line.clone());
                    if self.history.len() > MAX_HISTORY {
                        self.history.remove(0);
                    }
                }
                (b"\r\n".to_vec(), Some(LineEvent::Line(line)))
            }
            // Backspace or DEL
            0x7f | 0x08 => {
                if self.cursor_pos == 0 {
                    return (Vec::new(), None);
                }
                self.line_buffer.remove(self.cursor_pos - 1);
                self.cursor_pos -= 1;
                let mut echo = b"\x08".to_vec();
                echo.extend_from_slice(&self.line_buffer[self.cursor_pos..]);
                echo.push(b' ');
                echo.extend(std::iter::repeat(0x08).take(self.line_buffer.len() - self.cursor_pos + 1));
                (echo, None)
            }
            // Ctrl+C
            0x03 => {
                self.take_line();
                (b"^C\r\n".to_vec(), Some(LineEvent::Line(String::new())))
            }
            // Ctrl+D
            0x04 => {
                if self.line_buffer.is_empty() {
                    (Vec::new(), Some(LineEvent::Eof))
                } else {
                    (Vec::new(), None)
                }
            }
            // Ctrl+U (kill line)
            0x15 => (self.replace_line(&[]), None),
            // Ctrl+L (clear screen)
            0x0c => {
                let mut echo = b"\x1b[2J\x1b[H".to_vec();
                echo.extend_from_slice(&self.line_buffer);
                (echo, None)
            }
            b'\t' => (self.handle_tab_completion(), None),
            0x1b => {
                self.esc_state = EscapeState::GotEsc;
                (Vec::new(), None)
            }
            _ if byte >= 0x20 => {
                if self.line_buffer.len() >= MAX_LINE_LENGTH {
                    return (vec![0x07], None); // BEL
                }
                self.line_buffer.insert(self.cursor_pos, byte);
                self.cursor_pos += 1;
                // Redraw the tail when inserting mid-line.
                let mut echo = self.line_buffer[self.cursor_pos - 1..].to_vec();
                echo.extend(std::iter::repeat(0x08).take(self.line_buffer.len() - self.cursor_pos));
                (echo, None)
            }
            _ => (Vec::new(), None),
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.line_buffer).into_owned();
        self.history_index = None;
        self.saved_line.clear();
        self.line_buffer.clear();
        self.cursor_pos = 0;
        line
    }

    /// Replace the current line buffer with new content, returning echo bytes
    /// that clear the old line and display the new one.
    fn replace_line(&mut self, new_content: &[u8]) -> Vec<u8> {
        let mut echo = vec![0x08; self.cursor_pos];
        let old_len = self.line_buffer.len();
        echo.resize(echo.len() + old_len, b' ');
        echo.resize(echo.len() + old_len, 0x08);
        echo.extend_from_slice(new_content);
        self.line_buffer = new_content.to_vec();
        self.cursor_pos = new_content.len();
        echo
    }

    /// Up arrow
    fn history_prev(&mut self) -> Vec<u8> {
        if self.history.is_empty() {
            return Vec::new();
        }
        let new_index = match self.history_index {
            None => {
                self.saved_line = self.line_buffer.clone();
                self.history.len() - 1
            }
            Some(0) => return Vec::new(),
            Some(i) => i - 1,
        };
        self.history_index = Some(new_index);
        let entry = self.history[new_index].clone();
        self.replace_line(entry.as_bytes())
    }

    /// Down arrow
    fn history_next(&mut self) -> Vec<u8> {
        match self.history_index {
            None => Vec::new(),
            Some(i) if i + 1 >= self.history.len() => {
                // Past end of history - restore saved line
                self.history_index = None;
                let saved = std::mem::take(&mut self.saved_line);
                self.replace_line(&saved)
            }
            Some(i) => {
                self.history_index = Some(i + 1);
                let entry = self.history[i + 1].clone();
                self.replace_line(entry.as_bytes())
            }
        }
    }

    fn handle_tab_completion(&mut self) -> Vec<u8> {
        if self.cursor_pos != self.line_buffer.len() {
            return vec![0x07];
        }
        let current = String::from_utf8_lossy(&self.line_buffer).into_owned();
        let trimmed = current.trim_start();

        let completions = completions_for(trimmed);
        if completions.is_empty() {
            return vec![0x07];
        }

        if completions.len() == 1 {
            let suffix = format!("{} ", &completions[0][trimmed.len()..]);
            self.line_buffer.extend_from_slice(suffix.as_bytes());
            self.cursor_pos = self.line_buffer.len();
            return suffix.into_bytes();
        }

        let common = common_prefix(&completions);
        if common.len() > trimmed.len() {
            let suffix = common[trimmed.len()..].as_bytes().to_vec();
            self.line_buffer.extend_from_slice(&suffix);
            self.cursor_pos = self.line_buffer.len();
            return suffix;
        }

        // Show all options, then re-display the current line
        let mut echo = b"\r\n".to_vec();
        for c in &completions {
            echo.extend_from_slice(c.as_bytes());
            echo.extend_from_slice(b"  ");
        }
        echo.extend_from_slice(b"\r\n");
        echo.extend_from_slice(&self.line_buffer);
        echo
    }

    /// Get current line buffer content
    pub fn current_line(&self) -> String {
        String::from_utf8_lossy(&self.line_buffer).into_owned()
    }
}

fn completions_for(trimmed: &str) -> Vec<String> {
    if let Some(prefix) = trimmed.strip_prefix("wpm ") {
        if prefix.contains(' ') {
            return Vec::new();
        }
        return WPM_SUBCOMMANDS
            .iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| format!("wpm {}", c))
            .collect();
    }
    if trimmed.contains(' ') {
        return Vec::new();
    }
    let mut names: Vec<String> = commands::names()
        .filter(|c| c.starts_with(trimmed))
        .map(str::to_string)
        .collect();
    names.sort();
    names
}

/// Find the longest common prefix among a set of strings
fn common_prefix(strings: &[String]) -> String {
    let Some(first) = strings.first() else {
        return String::new();
    };
    let mut len = first.len();
    for s in &strings[1..] {
        len = len.min(s.len());
        for (i, (a, b)) in first.bytes().zip(s.bytes()).enumerate() {
            if a != b {
                len = len.min(i);
                break;
            }
        }
    }
    first[..len].to_string()
}
