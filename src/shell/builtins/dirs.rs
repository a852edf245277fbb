use std::env;
use std::path::PathBuf;

use crate::shell::builtins::{self, prelude::*};

pub struct Cd;

impl builtins::BuiltinCommand for Cd {
    const NAME: &'static str = builtins::CD_NAME;

    const HELP: &'static str = "\
cd: cd [dir]
    Change the current directory to DIR. The variable $HOME is the default dir.
    If DIR is '-', then the current directory will be the variable $OLDPWD,
    which is the last working directory. The new directory is printed and
    stored in $PWD.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let dir = match args.first().map(AsRef::as_ref) {
            None | Some("~") => env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| Error::builtin_command("cd: HOME not set", 1))?,
            Some("-") => env::var_os("OLDPWD")
                .map(PathBuf::from)
                .ok_or_else(|| Error::builtin_command("cd: OLDPWD not set", 1))?,
            Some(val) => PathBuf::from(val),
        };

        let old_dir = env::current_dir().context(ErrorKind::Io)?;
        env::set_current_dir(&dir).map_err(|e| {
            Error::builtin_command(format!("cd: {}: {}", dir.display(), e), 1)
        })?;
        let new_dir = env::current_dir().context(ErrorKind::Io)?;
        env::set_var("OLDPWD", old_dir);
        env::set_var("PWD", &new_dir);

        writeln!(stdout, "{}", new_dir.display()).context(ErrorKind::Io)?;
        Ok(())
    }
}

pub struct Pwd;

impl builtins::BuiltinCommand for Pwd {
    const NAME: &'static str = builtins::PWD_NAME;

    const HELP: &'static str = "\
pwd: pwd
    Print the name of the current working directory.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, _args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let cwd = env::current_dir().context(ErrorKind::Io)?;
        writeln!(stdout, "{}", cwd.display()).context(ErrorKind::Io)?;
        Ok(())
    }
}
