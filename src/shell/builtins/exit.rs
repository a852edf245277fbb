use crate::shell::builtins::{self, prelude::*};

const NUMERIC_ARGUMENT_REQUIRED_EXIT_STATUS: i32 = 2;

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is 0.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let status = exit_status(Self::NAME, args);
        shell.exit(Some(status));
    }
}

pub struct Quit;

impl builtins::BuiltinCommand for Quit {
    const NAME: &'static str = builtins::QUIT_NAME;

    const HELP: &'static str = "\
quit: quit [n]
    Same as exit.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        let status = exit_status(Self::NAME, args);
        shell.exit(Some(status));
    }
}

fn exit_status<T: AsRef<str>>(name: &str, args: &[T]) -> ExitStatus {
    let code = match args.first() {
        Some(arg) => parse_status_code(arg.as_ref()).unwrap_or_else(|| {
            eprintln!("quash: {}: {}: numeric argument required", name, arg.as_ref());
            NUMERIC_ARGUMENT_REQUIRED_EXIT_STATUS
        }),
        None => 0,
    };
    ExitStatus::from_status(code)
}

/// Statuses wrap to a byte, so `-1` and `255` are the same.
fn parse_status_code(arg: &str) -> Option<i32> {
    arg.parse::<i64>().ok().map(|n| (n & 0xff) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_wrap() {
        assert_eq!(parse_status_code("0"), Some(0));
        assert_eq!(parse_status_code("85"), Some(85));
        assert_eq!(parse_status_code("500"), Some(244));
        assert_eq!(parse_status_code("-244"), Some(12));
        assert_eq!(parse_status_code("abc"), None);
    }

    #[test]
    fn default_status_is_success() {
        assert!(exit_status("exit", &[] as &[&str]).success());
        assert_eq!(exit_status("exit", &["3"]).code(), Some(3));
        assert_eq!(
            exit_status("quit", &["nope"]).code(),
            Some(NUMERIC_ARGUMENT_REQUIRED_EXIT_STATUS)
        );
    }
}
