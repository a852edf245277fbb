use std::result;

use crate::core::tokenizer;
use crate::errors::Result;

/// One command of a pipeline. Words are kept exactly as typed; expansion
/// happens when the stage is launched.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub words: Vec<String>,
}

impl Stage {
    pub fn new<S: AsRef<str>>(words: &[S]) -> Self {
        Self {
            words: words.iter().map(|w| w.as_ref().to_string()).collect(),
        }
    }

    /// The program name as typed.
    pub fn program(&self) -> &str {
        &self.words[0]
    }

    /// The expanded argument vector, program name first.
    pub fn argv(&self) -> Result<Vec<String>> {
        tokenizer::expand_words(&self.words)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutputMode {
    Truncate,
    Append,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OutputRedirect {
    pub path: String,
    pub mode: OutputMode,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Redirection {
    pub stdin: Option<String>,
    pub stdout: Option<OutputRedirect>,
}

impl Redirection {
    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none()
    }

    /// Each stream may be redirected once.
    pub fn add(&mut self, operator: RedirectOperator, path: &str) -> result::Result<(), &'static str> {
        match operator {
            RedirectOperator::Input if self.stdin.is_some() => Err("input redirected more than once"),
            RedirectOperator::Input => {
                self.stdin = Some(path.to_string());
                Ok(())
            }
            RedirectOperator::Output(_) if self.stdout.is_some() => {
                Err("output redirected more than once")
            }
            RedirectOperator::Output(mode) => {
                self.stdout = Some(OutputRedirect {
                    path: path.to_string(),
                    mode,
                });
                Ok(())
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RedirectOperator {
    /// `<`
    Input,
    /// `>` or `>>`
    Output(OutputMode),
}

/// A word or a redirection, in the order they appear in a pipeline segment.
#[derive(Debug)]
pub enum Part<'a> {
    Word(&'a str),
    Redirect(RedirectOperator, &'a str),
}

/// A parsed line: one or more stages, connected by pipes when there is more
/// than one. Redirection only applies to single-stage lines.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandLine {
    pub input: String,
    pub stages: Vec<Stage>,
    pub redirection: Redirection,
    pub background: bool,
}

impl CommandLine {
    pub fn is_pipeline(&self) -> bool {
        self.stages.len() > 1
    }
}
