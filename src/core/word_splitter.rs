// src/core/word_splitter.rs

//! POSIX-style word expansion of a single line.
//!
//! The line goes through tilde expansion, parameter expansion, field splitting, pathname expansion
//! and quote removal, in that order, and comes out as an argument list. Anything that would need a
//! shell parser or a subshell is refused: unquoted operators (`|`, `&`, `;`, redirections, grouping),
//! command substitution, and references to variables that are not set.

use crate::constants::MAX_WORDS;
use crate::system::error::SysResult;
use glob::{MatchOptions, Pattern};
use std::iter::Peekable;
use std::path::PathBuf;
use std::str::Chars;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExpansionError {
    #[error("illegal unquoted character '{}'", .0.escape_default())]
    IllegalCharacter(char),
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("command substitution is not supported")]
    UnsupportedSubstitution,
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("expansion produced more than {0} words")]
    ResourceExhausted(usize),
}

/// Characters that end an unquoted field during field splitting.
const IFS: [char; 3] = [' ', '\t', '\n'];

/// One lexical piece of a word, tagged with how later stages may treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    /// Quoted or escaped text, or a tilde prefix: never split, never a pattern.
    Literal(String),
    /// Unquoted text from the line: may contain pattern characters.
    Unquoted(String),
    /// Result of an unquoted parameter expansion: split on IFS, may contain pattern characters.
    Expanded(String),
}

#[derive(Debug, Default)]
struct Word {
    pieces: Vec<Piece>,
}

impl Word {
    fn push_unquoted(&mut self, c: char) {
        if let Some(Piece::Unquoted(text)) = self.pieces.last_mut() {
            text.push(c);
        } else {
            self.pieces.push(Piece::Unquoted(c.to_string()));
        }
    }
}

/// A field under construction: the final text plus the same text as a glob pattern, with quoted
/// parts escaped.
#[derive(Debug, Default)]
struct Field {
    text: String,
    pattern: String,
    has_pattern: bool,
    quoted: bool,
}

impl Field {
    fn push_literal(&mut self, text: &str) {
        self.text.push_str(text);
        self.pattern.push_str(&Pattern::escape(text));
        self.quoted = true;
    }

    fn push_active(&mut self, text: &str) {
        self.text.push_str(text);
        self.pattern.push_str(text);
        self.has_pattern |= text.contains(['*', '?', '[']);
    }

    /// Empty unquoted fields vanish; `""` survives as an empty argument.
    fn is_kept(&self) -> bool {
        self.quoted || !self.text.is_empty()
    }
}

type Lookup<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// Configurable expander. `WordSplitter::new()` reads the process environment and the user's
/// home directory; tests and embedders can substitute both.
pub struct WordSplitter<'a> {
    lookup: Lookup<'a>,
    home: Option<PathBuf>,
    pathname_expansion: bool,
    max_words: usize,
}

impl std::fmt::Debug for WordSplitter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordSplitter")
            .field("home", &self.home)
            .field("pathname_expansion", &self.pathname_expansion)
            .field("max_words", &self.max_words)
            .finish_non_exhaustive()
    }
}

impl Default for WordSplitter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> WordSplitter<'a> {
    pub fn new() -> Self {
        Self {
            lookup: Box::new(|name| std::env::var(name).ok()),
            home: dirs::home_dir(),
            pathname_expansion: true,
            max_words: MAX_WORDS,
        }
    }

    /// Resolves `$NAME` references through `lookup` instead of the environment.
    pub fn with_variables<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'a,
    {
        self.lookup = Box::new(lookup);
        self
    }

    /// Directory substituted for a leading `~`. `None` leaves `~` as is.
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn pathname_expansion(mut self, enabled: bool) -> Self {
        self.pathname_expansion = enabled;
        self
    }

    pub fn max_words(mut self, limit: usize) -> Self {
        self.max_words = limit;
        self
    }

    /// Expands `line` into its argument list, in textual order. An empty or blank line yields an
    /// empty list.
    pub fn expand(&self, line: &str) -> Result<Vec<String>, ExpansionError> {
        let mut result = Vec::new();
        for word in self.tokenize(line)? {
            let word = self.expand_tilde(word);
            for field in split_fields(word) {
                for expanded in self.expand_pathname(field) {
                    if result.len() == self.max_words {
                        return Err(ExpansionError::ResourceExhausted(self.max_words));
                    }
                    result.push(expanded);
                }
            }
        }
        log::debug!("Expanded {:?} into {} word(s)", line, result.len());
        Ok(result)
    }

    fn tokenize(&self, line: &str) -> Result<Vec<Word>, ExpansionError> {
        let mut words = Vec::new();
        let mut current: Option<Word> = None;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                ' ' | '\t' => {
                    if let Some(word) = current.take() {
                        words.push(word);
                    }
                }
                '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')' | '{' | '}' => {
                    return Err(ExpansionError::IllegalCharacter(c));
                }
                '`' => return Err(ExpansionError::UnsupportedSubstitution),
                '\'' => {
                    let text = single_quoted(&mut chars)?;
                    current
                        .get_or_insert_with(Word::default)
                        .pieces
                        .push(Piece::Literal(text));
                }
                '"' => {
                    let text = self.double_quoted(&mut chars)?;
                    current
                        .get_or_insert_with(Word::default)
                        .pieces
                        .push(Piece::Literal(text));
                }
                '\\' => match chars.next() {
                    // Line continuation.
                    Some('\n') => {}
                    Some(escaped) => current
                        .get_or_insert_with(Word::default)
                        .pieces
                        .push(Piece::Literal(escaped.to_string())),
                    None => {
                        return Err(ExpansionError::SyntaxError(
                            "dangling escape at end of line".to_string(),
                        ));
                    }
                },
                '$' => {
                    let word = current.get_or_insert_with(Word::default);
                    match self.dollar(&mut chars)? {
                        Some(value) => word.pieces.push(Piece::Expanded(value)),
                        None => word.push_unquoted('$'),
                    }
                }
                other => current.get_or_insert_with(Word::default).push_unquoted(other),
            }
        }
        if let Some(word) = current {
            words.push(word);
        }
        Ok(words)
    }

    fn double_quoted(&self, chars: &mut Peekable<Chars<'_>>) -> Result<String, ExpansionError> {
        let mut text = String::new();
        loop {
            match chars.next() {
                None => {
                    return Err(ExpansionError::SyntaxError(
                        "unterminated double quote".to_string(),
                    ));
                }
                Some('"') => return Ok(text),
                Some('`') => return Err(ExpansionError::UnsupportedSubstitution),
                Some('\\') => match chars.next() {
                    Some('\n') => {}
                    Some(escaped @ ('$' | '`' | '"' | '\\')) => text.push(escaped),
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => {
                        return Err(ExpansionError::SyntaxError(
                            "unterminated double quote".to_string(),
                        ));
                    }
                },
                Some('$') => match self.dollar(chars)? {
                    Some(value) => text.push_str(&value),
                    None => text.push('$'),
                },
                Some(other) => text.push(other),
            }
        }
    }

    /// Handles what follows a `$`. `Ok(None)` means the `$` stands for itself.
    fn dollar(&self, chars: &mut Peekable<Chars<'_>>) -> Result<Option<String>, ExpansionError> {
        match chars.peek().copied() {
            Some('(') => Err(ExpansionError::UnsupportedSubstitution),
            Some('{') => {
                chars.next();
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => body.push(c),
                        None => {
                            return Err(ExpansionError::SyntaxError(
                                "unterminated '${'".to_string(),
                            ));
                        }
                    }
                }
                self.braced(&body).map(Some)
            }
            Some(c) if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(c) = chars.next_if(|c| is_name_char(*c)) {
                    name.push(c);
                }
                self.variable(&name).map(Some)
            }
            Some(c) if c.is_ascii_digit() => {
                chars.next();
                self.variable(&c.to_string()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// `${NAME}`, `${NAME:-word}` (default when unset or empty) and `${NAME-word}` (default when
    /// unset).
    fn braced(&self, body: &str) -> Result<String, ExpansionError> {
        let name_len = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
        let (name, operator) = body.split_at(name_len);
        let bad_substitution = || ExpansionError::SyntaxError(format!("bad substitution '${{{body}}}'"));
        if name.is_empty() {
            return Err(bad_substitution());
        }

        let value = (self.lookup)(name);
        if let Some(word) = operator.strip_prefix(":-") {
            return match value {
                Some(value) if !value.is_empty() => Ok(value),
                _ => self.expand_default(word),
            };
        }
        if let Some(word) = operator.strip_prefix('-') {
            return match value {
                Some(value) => Ok(value),
                None => self.expand_default(word),
            };
        }
        if !operator.is_empty() {
            return Err(bad_substitution());
        }
        value.ok_or_else(|| ExpansionError::UndefinedVariable(name.to_string()))
    }

    fn variable(&self, name: &str) -> Result<String, ExpansionError> {
        (self.lookup)(name).ok_or_else(|| ExpansionError::UndefinedVariable(name.to_string()))
    }

    /// Default words may reference other variables; everything else in them is taken literally.
    fn expand_default(&self, word: &str) -> Result<String, ExpansionError> {
        let mut text = String::new();
        let mut chars = word.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '`' => return Err(ExpansionError::UnsupportedSubstitution),
                '$' => match self.dollar(&mut chars)? {
                    Some(value) => text.push_str(&value),
                    None => text.push('$'),
                },
                other => text.push(other),
            }
        }
        Ok(text)
    }

    /// An unquoted `~` alone or followed by `/` at the start of a word becomes the home directory.
    /// `~user` forms are left alone.
    fn expand_tilde(&self, mut word: Word) -> Word {
        let Some(home) = &self.home else {
            return word;
        };
        let Some(Piece::Unquoted(first)) = word.pieces.first_mut() else {
            return word;
        };
        if first != "~" && !first.starts_with("~/") {
            return word;
        }
        let rest = first.split_off(1);
        let home = Piece::Literal(home.to_string_lossy().into_owned());
        word.pieces.splice(0..1, [home, Piece::Unquoted(rest)]);
        word
    }

    fn expand_pathname(&self, field: Field) -> Vec<String> {
        if !self.pathname_expansion || !field.has_pattern {
            return vec![field.text];
        }
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let matches: Vec<String> = match glob::glob_with(&field.pattern, options) {
            Ok(paths) => paths
                .filter_map(Result::ok)
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            Err(e) => {
                log::debug!("Not a valid pattern {:?}: {}", field.pattern, e);
                Vec::new()
            }
        };
        if matches.is_empty() {
            vec![field.text]
        } else {
            matches
        }
    }
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_ascii_alphanumeric()
}

fn single_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, ExpansionError> {
    let mut text = String::new();
    for c in chars.by_ref() {
        if c == '\'' {
            return Ok(text);
        }
        text.push(c);
    }
    Err(ExpansionError::SyntaxError(
        "unterminated single quote".to_string(),
    ))
}

fn split_fields(word: Word) -> Vec<Field> {
    let mut fields = Vec::new();
    let mut current = Field::default();
    for piece in word.pieces {
        match piece {
            Piece::Literal(text) => current.push_literal(&text),
            Piece::Unquoted(text) => current.push_active(&text),
            Piece::Expanded(text) => {
                let mut parts = text.split(IFS);
                if let Some(first) = parts.next() {
                    current.push_active(first);
                }
                for part in parts {
                    let finished = std::mem::take(&mut current);
                    if finished.is_kept() {
                        fields.push(finished);
                    }
                    current.push_active(part);
                }
            }
        }
    }
    if current.is_kept() {
        fields.push(current);
    }
    fields
}

/// Splits `line` at every `separator` that is not quoted or escaped. The pieces keep their quoting
/// so each can be expanded on its own; unbalanced quotes are left for `expand` to report.
pub fn split_unquoted(line: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => {}
            (_, '\\') => escaped = true,
            (Some('"'), '"') => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, c) if c == separator => {
                pieces.push(line.get(start..index).unwrap_or_default());
                start = index + c.len_utf8();
            }
            (None, _) => {}
        }
    }
    pieces.push(line.get(start..).unwrap_or_default());
    pieces
}

/// Expands `line` with the process environment and the default options.
pub fn expand(line: &str) -> SysResult<Vec<String>> {
    Ok(WordSplitter::new().expand(line)?)
}
