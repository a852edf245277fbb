use std::fmt;
use std::io::{self, BufRead};

use atty::{self, Stream};
use failure::{Fail, ResultExt};
use rustyline::{
    self,
    completion::{Completer, FilenameCompleter, Pair},
    error::ReadlineError,
    highlight::Highlighter,
    hint::Hinter,
    validate::Validator,
    CompletionType, Config, Helper,
};

use crate::errors::{ErrorKind, Result};

struct EditorHelper(FilenameCompleter);

impl Completer for EditorHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &rustyline::Context<'_>,
    ) -> ::std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        self.0.complete(line, pos, ctx)
    }
}

impl Hinter for EditorHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        None
    }
}

impl Highlighter for EditorHelper {}

impl Helper for EditorHelper {}

impl Validator for EditorHelper {}

enum Input {
    Terminal(rustyline::Editor<EditorHelper>),
    /// Lines piped in; no prompt, no history.
    Stdin(io::Stdin),
}

/// Reads command lines, keeping an in-memory history when attached to a
/// terminal.
pub struct Editor {
    input: Input,
    history_capacity: usize,
}

impl Editor {
    /// Uses rustyline if stdin is a terminal.
    pub fn with_capacity(history_capacity: usize) -> Editor {
        if atty::is(Stream::Stdin) {
            Self::terminal(history_capacity)
        } else {
            Self::stdin()
        }
    }

    fn terminal(history_capacity: usize) -> Editor {
        let config = Config::builder()
            .max_history_size(history_capacity)
            .history_ignore_space(true)
            .completion_type(CompletionType::Circular)
            .build();

        let mut internal = rustyline::Editor::with_config(config);
        internal.set_helper(Some(EditorHelper(FilenameCompleter::new())));

        Editor {
            input: Input::Terminal(internal),
            history_capacity,
        }
    }

    fn stdin() -> Editor {
        Editor {
            input: Input::Stdin(io::stdin()),
            history_capacity: 0,
        }
    }

    /// Returns `None` at end of input. The trailing newline is removed.
    pub fn readline(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.input {
            Input::Terminal(ref mut internal) => match internal.readline(prompt) {
                Ok(line) => Ok(Some(line)),
                Err(ReadlineError::Eof) => Ok(None),
                // Ctrl-C abandons the current line only.
                Err(ReadlineError::Interrupted) => Ok(Some(String::new())),
                Err(e) => Err(e.context(ErrorKind::Readline).into()),
            },
            Input::Stdin(ref stdin) => {
                let mut line = String::new();
                // Locked per line; buffered input stays in the global reader.
                let n = stdin.lock().read_line(&mut line).context(ErrorKind::Io)?;
                if n == 0 {
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

    pub fn add_history_entry(&mut self, line: &str) {
        if let Input::Terminal(ref mut internal) = self.input {
            internal.add_history_entry(line);
        }
    }

    pub fn history_len(&self) -> usize {
        match self.input {
            Input::Terminal(ref internal) => internal.history().len(),
            Input::Stdin(_) => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self.input {
            Input::Terminal(_) => true,
            Input::Stdin(_) => false,
        }
    }
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "terminal: {}", self.is_terminal())?;
        writeln!(f, "history: {}", self.history_len())?;
        write!(f, "capacity: {}", self.history_capacity)
    }
}
