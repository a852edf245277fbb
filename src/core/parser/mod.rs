//! Quash Parser
//!
//! Turns a line into a `CommandLine` before any process is created. A line
//! containing `|` is a pipeline; otherwise it is a single command that may
//! redirect its input and output. The two cannot be combined.

use std::fmt;

use lalrpop_util::{lalrpop_mod, ParseError};
use log::debug;

use self::ast::{CommandLine, Redirection, Stage};
use self::grammar::LineParser;
use crate::errors::{Error, Result};

pub mod ast;
lalrpop_mod!(
    #[allow(clippy::all, dead_code, unused_qualifications)]
    pub(crate) grammar,
    "/core/parser/grammar.rs"
);

const REDIRECT_OPERATORS: [&str; 3] = [">>", ">", "<"];

impl CommandLine {
    /// Returns `None` when the line holds no command.
    pub fn parse(input: &str) -> Result<Option<Self>> {
        if input.trim().is_empty() {
            return Ok(None);
        }

        let (segments, background) = LineParser::new()
            .parse(input)
            .map_err(|e| syntax_error(input, e))?;
        let command_line = Self::from_segments(input, segments, background)?;
        debug!("parsed CommandLine: {:?}", command_line);
        Ok(Some(command_line))
    }

    fn from_segments(
        input: &str,
        mut segments: Vec<(Stage, Redirection)>,
        background: bool,
    ) -> Result<Self> {
        let (stages, redirection) = if segments.len() == 1 {
            let (stage, redirection) = segments.remove(0);
            (vec![stage], redirection)
        } else {
            if segments.iter().any(|(_, redirection)| !redirection.is_empty()) {
                return Err(Error::syntax("redirection cannot be combined with '|'"));
            }
            if background {
                return Err(Error::syntax(
                    "background execution is not supported for pipelines",
                ));
            }
            let stages = segments.into_iter().map(|(stage, _)| stage).collect();
            (stages, Redirection::default())
        };

        Ok(CommandLine {
            input: input.trim().to_string(),
            stages,
            redirection,
            background,
        })
    }
}

pub(crate) fn syntax_error<T: fmt::Display>(
    input: &str,
    error: ParseError<usize, T, &'static str>,
) -> Error {
    match error {
        ParseError::User { error } => Error::syntax(error),
        ParseError::UnrecognizedToken {
            token: (start, token, _),
            ..
        } => unexpected(input, start, &format!("'{}'", token)),
        ParseError::UnrecognizedEOF { location, .. } => unexpected(input, location, "end of line"),
        ParseError::ExtraToken {
            token: (_, token, _),
        } => Error::syntax(format!("unexpected '{}'", token)),
        ParseError::InvalidToken { location } => {
            Error::syntax(format!("invalid input at offset {}", location))
        }
    }
}

/// Names what is missing after the operator preceding `location`.
fn unexpected(input: &str, location: usize, found: &str) -> Error {
    let before = input.get(..location).unwrap_or(input).trim_end();
    if before.ends_with('|') {
        return Error::syntax("empty command in pipeline");
    }
    match REDIRECT_OPERATORS.iter().find(|op| before.ends_with(*op)) {
        Some(op) => Error::syntax(format!("missing filename after '{}'", op)),
        None => Error::syntax(format!("unexpected {}", found)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::core::parser::ast::{OutputMode, OutputRedirect};
    use crate::errors::ErrorKind;

    fn parse(input: &str) -> CommandLine {
        CommandLine::parse(input)
            .expect("parse failed")
            .expect("no command")
    }

    fn assert_syntax_error(input: &str) {
        match CommandLine::parse(input) {
            Err(e) => match *e.kind() {
                ErrorKind::Syntax(_) => {}
                ref kind => panic!("unexpected error kind for {:?}: {:?}", input, kind),
            },
            Ok(command) => panic!("expected syntax error for {:?}: {:?}", input, command),
        }
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(CommandLine::parse("").unwrap(), None);
        assert_eq!(CommandLine::parse("  \t ").unwrap(), None);
    }

    #[test]
    fn test_simple_command() {
        let command = parse("ls -la  /tmp");
        assert_eq!(command.stages, vec![Stage::new(&["ls", "-la", "/tmp"])]);
        assert!(command.redirection.is_empty());
        assert!(!command.background);
        assert!(!command.is_pipeline());
    }

    #[test]
    fn test_words_are_not_expanded() {
        let command = parse("echo $HOME");
        assert_eq!(command.stages[0].words, vec!["echo", "$HOME"]);
    }

    #[test]
    fn test_background() {
        let command = parse("sleep 10 &");
        assert!(command.background);
        assert_eq!(command.stages, vec![Stage::new(&["sleep", "10"])]);
        assert_eq!(command.input, "sleep 10 &");
    }

    #[test]
    fn test_background_redirected_command() {
        let command = parse("sort < in > out &");
        assert!(command.background);
        assert_eq!(command.redirection.stdin, Some("in".to_string()));
    }

    #[test]
    fn test_pipeline() {
        let command = parse("cat file | grep needle | wc -l");
        assert!(command.is_pipeline());
        assert_eq!(
            command.stages,
            vec![
                Stage::new(&["cat", "file"]),
                Stage::new(&["grep", "needle"]),
                Stage::new(&["wc", "-l"]),
            ]
        );
    }

    #[test]
    fn test_input_redirection() {
        let command = parse("sort < names.txt");
        assert_eq!(command.stages, vec![Stage::new(&["sort"])]);
        assert_eq!(command.redirection.stdin, Some("names.txt".to_string()));
        assert_eq!(command.redirection.stdout, None);
    }

    #[test]
    fn test_output_redirection_modes() {
        let truncate = parse("ls > out.txt");
        assert_eq!(
            truncate.redirection.stdout,
            Some(OutputRedirect {
                path: "out.txt".to_string(),
                mode: OutputMode::Truncate,
            })
        );

        let append = parse("ls >> out.txt");
        assert_eq!(
            append.redirection.stdout,
            Some(OutputRedirect {
                path: "out.txt".to_string(),
                mode: OutputMode::Append,
            })
        );
    }

    #[test]
    fn test_input_and_output_redirection() {
        let command = parse("sort < in.txt >> out.txt");
        assert_eq!(command.stages, vec![Stage::new(&["sort"])]);
        assert_eq!(command.redirection.stdin, Some("in.txt".to_string()));
        assert_eq!(
            command.redirection.stdout,
            Some(OutputRedirect {
                path: "out.txt".to_string(),
                mode: OutputMode::Append,
            })
        );
    }

    #[test]
    fn test_operator_order_is_free() {
        assert_eq!(parse("sort > out < in"), {
            let mut expected = parse("sort < in > out");
            expected.input = "sort > out < in".to_string();
            expected
        });
    }

    #[test]
    fn test_words_after_filename_are_arguments() {
        let command = parse("grep > out.txt needle");
        assert_eq!(command.stages, vec![Stage::new(&["grep", "needle"])]);
    }

    #[test]
    fn test_syntax_errors() {
        assert_syntax_error("ls >");
        assert_syntax_error("ls <");
        assert_syntax_error("ls > >> out");
        assert_syntax_error("> out");
        assert_syntax_error("ls < a < b");
        assert_syntax_error("ls > a >> b");
        assert_syntax_error("ls |");
        assert_syntax_error("| wc");
        assert_syntax_error("ls || wc");
        assert_syntax_error("cat < in | wc");
        assert_syntax_error("ls | wc > out");
        assert_syntax_error("ls | wc &");
        assert_syntax_error("&");
        assert_syntax_error("echo & ls");
    }

    fn assert_syntax_message(input: &str, expected: &str) {
        match CommandLine::parse(input) {
            Err(e) => assert_eq!(e.to_string(), format!("syntax error: {}", expected)),
            Ok(command) => panic!("expected syntax error for {:?}: {:?}", input, command),
        }
    }

    #[test]
    fn test_syntax_error_messages() {
        assert_syntax_message("ls >", "missing filename after '>'");
        assert_syntax_message("ls >>", "missing filename after '>>'");
        assert_syntax_message("ls > >> out", "missing filename after '>'");
        assert_syntax_message("sort < | wc", "missing filename after '<'");
        assert_syntax_message("ls |", "empty command in pipeline");
        assert_syntax_message("ls || wc", "empty command in pipeline");
        assert_syntax_message("| wc", "unexpected '|'");
        assert_syntax_message("&", "unexpected '&'");
        assert_syntax_message("> out", "missing command");
        assert_syntax_message("ls < a < b", "input redirected more than once");
        assert_syntax_message("ls > a >> b", "output redirected more than once");
        assert_syntax_message("cat < in | wc", "redirection cannot be combined with '|'");
        assert_syntax_message(
            "ls | wc &",
            "background execution is not supported for pipelines",
        );
    }

    #[test]
    fn test_ampersand_inside_a_word() {
        let command = parse("echo a&b && c&");
        assert!(!command.background);
        assert_eq!(command.stages[0].words, vec!["echo", "a&b", "&&", "c&"]);
    }

    #[test]
    fn test_operators_without_spaces() {
        let command = parse("sort<in>>out");
        assert_eq!(command.stages, vec![Stage::new(&["sort"])]);
        assert_eq!(command.redirection.stdin, Some("in".to_string()));
        assert_eq!(
            command.redirection.stdout,
            Some(OutputRedirect {
                path: "out".to_string(),
                mode: OutputMode::Append,
            })
        );

        let command = parse("ls|wc -l");
        assert_eq!(
            command.stages,
            vec![Stage::new(&["ls"]), Stage::new(&["wc", "-l"])]
        );
    }
}
