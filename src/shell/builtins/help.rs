use crate::shell::builtins::{
    self,
    dirs::{Cd, Pwd},
    echo::Echo,
    env::Export,
    exit::{Exit, Quit},
    jobs::Jobs,
    kill::Kill,
    prelude::*,
    BuiltinCommand,
};

pub struct Help;

impl builtins::BuiltinCommand for Help {
    const NAME: &'static str = builtins::HELP_NAME;

    const HELP: &'static str = "\
help: help [command ...]
    Display helpful information about builtin commands. If COMMAND is specified,
    gives detailed help on all commands matching COMMAND, otherwise a list of the
    builtins is printed.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        if args.is_empty() {
            for usage in all_usage_strings() {
                writeln!(stdout, "{}", usage).context(ErrorKind::Io)?;
            }
            return Ok(());
        }

        let mut all_invalid = true;
        for arg in args {
            if let Some(msg) = help_text(arg.as_ref()) {
                writeln!(stdout, "{}", msg).context(ErrorKind::Io)?;
                all_invalid = false;
            }
        }
        if all_invalid {
            let topic = args.last().map_or("", AsRef::as_ref);
            return Err(Error::builtin_command(
                format!("help: no help topics match `{}'", topic),
                1,
            ));
        }
        Ok(())
    }
}

fn help_text(name: &str) -> Option<&'static str> {
    let msg = match name {
        builtins::CD_NAME => Cd::HELP,
        builtins::ECHO_NAME => Echo::HELP,
        builtins::EXIT_NAME => Exit::HELP,
        builtins::EXPORT_NAME => Export::HELP,
        builtins::HELP_NAME => Help::HELP,
        builtins::JOBS_NAME => Jobs::HELP,
        builtins::KILL_NAME => Kill::HELP,
        builtins::PWD_NAME => Pwd::HELP,
        builtins::QUIT_NAME => Quit::HELP,
        _ => return None,
    };
    Some(msg)
}

fn all_usage_strings() -> Vec<String> {
    vec![
        Cd::usage(),
        Echo::usage(),
        Exit::usage(),
        Export::usage(),
        Help::usage(),
        Jobs::usage(),
        Kill::usage(),
        Pwd::usage(),
        Quit::usage(),
    ]
}
