// src/core/line_editor.rs

//! Interactive line input with history.
//!
//! On a terminal, keys are read one at a time through `console` (re-exported by `dialoguer`) and
//! edited in a small line buffer: cursor movement, deletion, history recall with the arrow keys,
//! Ctrl-U to kill the line and Ctrl-D on an empty line for end-of-input. When input or output is
//! not a terminal (pipes, files, tests) the editor falls back to plain buffered reads and writes
//! the prompt as is. In both cases the caller decides what goes into the history: nothing is
//! recorded implicitly.

use crate::constants::{CONTINUATION_PROMPT, STDIN_FILENO};
use crate::core::history::History;
use crate::system::error::{SysError, SysResult};
use crate::system::fd::is_terminal;
use dialoguer::console::{Key, Term};
use nix::errno::Errno;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::Path;

const CTRL_D: char = '\x04';
const CTRL_U: char = '\x15';

/// What a key did to the line being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Edited,
    Ignored,
    Submit,
    EndOfInput,
    Cancel,
}

/// The line being typed on a terminal. Columns are counted as one per character.
#[derive(Debug, Default)]
struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
    /// How many entries back the recall is, and the line that was being typed before it started.
    recall: Option<(usize, Vec<char>)>,
}

impl LineBuffer {
    fn apply(&mut self, key: Key, history: &History) -> Step {
        match key {
            Key::Enter => Step::Submit,
            Key::CtrlC => Step::Cancel,
            Key::Char(CTRL_D) if self.chars.is_empty() => Step::EndOfInput,
            Key::Char(CTRL_D) | Key::Del => {
                if self.cursor == self.chars.len() {
                    return Step::Ignored;
                }
                self.chars.remove(self.cursor);
                Step::Edited
            }
            Key::Char(CTRL_U) => {
                self.chars = self.chars.split_off(self.cursor);
                self.cursor = 0;
                Step::Edited
            }
            Key::Char(c) if !c.is_control() => {
                self.chars.insert(self.cursor, c);
                self.cursor += 1;
                Step::Edited
            }
            Key::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
                Step::Edited
            }
            Key::ArrowLeft if self.cursor > 0 => {
                self.cursor -= 1;
                Step::Edited
            }
            Key::ArrowRight if self.cursor < self.chars.len() => {
                self.cursor += 1;
                Step::Edited
            }
            Key::Home => {
                self.cursor = 0;
                Step::Edited
            }
            Key::End => {
                self.cursor = self.chars.len();
                Step::Edited
            }
            Key::ArrowUp => self.recall(history, true),
            Key::ArrowDown => self.recall(history, false),
            _ => Step::Ignored,
        }
    }

    fn recall(&mut self, history: &History, older: bool) -> Step {
        let current = self.recall.as_ref().map(|(back, _)| *back);
        let next = match (current, older) {
            (None, false) => return Step::Ignored,
            (None, true) => Some(0),
            (Some(back), true) => Some(back + 1),
            (Some(0), false) => None,
            (Some(back), false) => Some(back - 1),
        };
        match next {
            Some(back) => {
                let Some(entry) = history.recent(back) else {
                    return Step::Ignored;
                };
                let entry = entry.chars().collect();
                let draft = match self.recall.take() {
                    Some((_, draft)) => draft,
                    None => std::mem::take(&mut self.chars),
                };
                self.recall = Some((back, draft));
                self.replace(entry);
            }
            None => {
                if let Some((_, draft)) = self.recall.take() {
                    self.replace(draft);
                }
            }
        }
        Step::Edited
    }

    fn replace(&mut self, chars: Vec<char>) {
        self.cursor = chars.len();
        self.chars = chars;
    }

    fn text(&self) -> String {
        self.chars.iter().collect()
    }

    fn render(&self, term: &Term, prompt: &str) -> io::Result<()> {
        term.clear_line()?;
        term.write_str(prompt)?;
        term.write_str(&self.text())?;
        let behind = self.chars.len() - self.cursor;
        if behind > 0 {
            term.move_cursor_left(behind)?;
        }
        term.flush()
    }
}

/// Reads one line on `term`. `Ok(None)` is Ctrl-D on an empty line or a hung-up terminal.
fn read_terminal_line(term: &Term, prompt: &str, history: &History) -> SysResult<Option<String>> {
    let fail = |e| editor_error("read from", "terminal", e);
    let mut buffer = LineBuffer::default();
    buffer.render(term, prompt).map_err(fail)?;
    loop {
        let key = match term.read_key_raw() {
            Ok(key) => key,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(fail(e)),
        };
        match buffer.apply(key, history) {
            Step::Edited => buffer.render(term, prompt).map_err(fail)?,
            Step::Ignored => {}
            Step::Submit => {
                term.write_line("").map_err(fail)?;
                return Ok(Some(buffer.text()));
            }
            Step::EndOfInput => {
                term.write_line("").map_err(fail)?;
                return Ok(None);
            }
            Step::Cancel => {
                term.write_line("^C").map_err(fail)?;
                return Err(SysError::os("read_line", Errno::EINTR));
            }
        }
    }
}

enum Backend {
    Terminal(Term),
    Stream {
        input: Box<dyn BufRead>,
        output: Box<dyn Write>,
    },
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminal(term) => f.debug_tuple("Terminal").field(term).finish(),
            Self::Stream { .. } => f.write_str("Stream"),
        }
    }
}

#[derive(Debug)]
pub struct LineEditor {
    backend: Backend,
    history: History,
    multi_line: bool,
}

impl LineEditor {
    /// An editor on the process's standard streams: interactive when both are terminals.
    pub fn new() -> Self {
        let term = Term::stdout();
        let interactive = term.is_term() && is_terminal(STDIN_FILENO).unwrap_or(false);
        let backend = if interactive {
            Backend::Terminal(term)
        } else {
            Backend::Stream {
                input: Box::new(io::stdin().lock()),
                output: Box::new(io::stdout()),
            }
        };
        log::debug!("Line editor backend: {:?}", backend);
        Self::with_backend(backend)
    }

    /// A non-interactive editor over arbitrary streams.
    pub fn with_streams(input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Self::with_backend(Backend::Stream {
            input: Box::new(input),
            output: Box::new(output),
        })
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            history: History::default(),
            multi_line: false,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self.backend, Backend::Terminal(_))
    }

    /// Shows `prompt` and reads one line, without its terminator. `Ok(None)` is end-of-input,
    /// which is distinct from an empty line.
    ///
    /// In multi-line mode a line ending in an unescaped backslash continues on the next one; the
    /// backslash and the line break are removed.
    pub fn read_line(&mut self, prompt: &str) -> SysResult<Option<String>> {
        let Some(mut line) = self.read_physical_line(prompt)? else {
            return Ok(None);
        };
        if self.multi_line {
            while let Some(head) = continued(&line) {
                let head = head.to_string();
                match self.read_physical_line(CONTINUATION_PROMPT)? {
                    Some(next) => line = head + &next,
                    None => {
                        line = head;
                        break;
                    }
                }
            }
        }
        Ok(Some(line))
    }

    fn read_physical_line(&mut self, prompt: &str) -> SysResult<Option<String>> {
        match &mut self.backend {
            Backend::Terminal(term) => read_terminal_line(term, prompt, &self.history),
            Backend::Stream { input, output } => {
                output
                    .write_all(prompt.as_bytes())
                    .and_then(|()| output.flush())
                    .map_err(|e| editor_error("write to", "output", e))?;
                let mut line = String::new();
                let count = input
                    .read_line(&mut line)
                    .map_err(|e| editor_error("read from", "input", e))?;
                if count == 0 {
                    return Ok(None);
                }
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Ok(Some(line))
            }
        }
    }

    /// Records `line` in the history. Returns false when it was not stored (a repeat of the
    /// previous entry).
    pub fn add_history(&mut self, line: &str) -> bool {
        self.history.add(line)
    }

    pub fn load_history(&mut self, path: &Path) -> SysResult<usize> {
        self.history.load(path)
    }

    pub fn save_history(&self, path: &Path) -> SysResult<()> {
        self.history.save(path)
    }

    /// Caps the history length, dropping the oldest entries. Zero is rejected with EINVAL.
    pub fn set_max_history(&mut self, max_len: usize) -> SysResult<()> {
        self.history.set_max_len(max_len)
    }

    /// Turns backslash continuation on or off. It only decides whether a trailing backslash
    /// asks for another physical line; it does not change how a long line is drawn.
    pub fn set_multi_line(&mut self, enabled: bool) {
        self.multi_line = enabled;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear_screen(&mut self) -> SysResult<()> {
        match &mut self.backend {
            Backend::Terminal(term) => term
                .clear_screen()
                .map_err(|e| editor_error("clear", "terminal", e)),
            Backend::Stream { output, .. } => output
                .write_all(b"\x1b[H\x1b[2J")
                .and_then(|()| output.flush())
                .map_err(|e| editor_error("clear", "output", e)),
        }
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

/// A signal interrupting the read is reported as EINTR, like every other blocking primitive.
fn editor_error(action: &'static str, target: &str, source: io::Error) -> SysError {
    if source.kind() == io::ErrorKind::Interrupted {
        return SysError::os("read_line", Errno::EINTR);
    }
    SysError::EditorIo {
        action,
        target: target.to_string(),
        source,
    }
}

/// The line without its continuation backslash, if it ends in an odd number of backslashes.
fn continued(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        line.strip_suffix('\\')
    } else {
        None
    }
}
