use std::env;

use log::debug;

use crate::core::variable_expansion;
use crate::shell::builtins::{self, prelude::*};

pub struct Export;

impl builtins::BuiltinCommand for Export {
    const NAME: &'static str = builtins::EXPORT_NAME;

    const HELP: &'static str = "\
export: export NAME=VALUE ...
    Set each environment variable NAME to VALUE. A VALUE starting with '$'
    is expanded first.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], _stdout: &mut dyn Write) -> Result<()> {
        if args.is_empty() {
            return Err(Error::builtin_command("export: missing argument", 1));
        }

        for arg in args {
            let (name, value) = split_assignment(arg.as_ref())
                .ok_or_else(|| Error::builtin_command("export: invalid syntax", 1))?;
            let value = if value.starts_with('$') {
                variable_expansion::expand(value)?
            } else {
                value.to_string()
            };
            debug!("export {}={}", name, value);
            env::set_var(name, value);
        }

        Ok(())
    }
}

/// `NAME=VALUE` with both sides non-empty.
fn split_assignment(arg: &str) -> Option<(&str, &str)> {
    let mut parts = arg.splitn(2, '=');
    let name = parts.next()?;
    let value = parts.next()?;
    if name.is_empty() || value.is_empty() {
        None
    } else {
        Some((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use crate::shell::builtins::BuiltinCommand;
    use crate::shell::ShellConfig;

    macro_rules! generate_unique_env_key {
        () => {
            format!("KEY_LINE{}_COLUMN{}", line!(), column!())
        };
    }

    fn assert_builtin_error(result: Result<()>, expected: &str) {
        match result {
            Err(e) => assert_eq!(
                *e.kind(),
                ErrorKind::BuiltinCommand {
                    message: expected.to_string(),
                    code: 1,
                }
            ),
            Ok(()) => panic!("expected error: {}", expected),
        }
    }

    #[test]
    fn export_missing_argument() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();
        assert_builtin_error(
            Export::run(&mut shell, &[] as &[&str], &mut io::sink()),
            "export: missing argument",
        );
    }

    #[test]
    fn export_invalid_syntax() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();
        let key = generate_unique_env_key!();
        for arg in &[key.clone(), format!("{}=", key), "=value".to_string()] {
            assert_builtin_error(
                Export::run(&mut shell, &[arg], &mut io::sink()),
                "export: invalid syntax",
            );
        }
        assert!(env::var(&key).is_err());
    }

    #[test]
    fn export_assignment() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();

        let key = generate_unique_env_key!();
        Export::run(&mut shell, &[format!("{}=bar", key)], &mut io::sink()).unwrap();
        assert_eq!(env::var(&key).unwrap(), "bar");

        Export::run(&mut shell, &[format!("{}=a=b", key)], &mut io::sink()).unwrap();
        assert_eq!(env::var(&key).unwrap(), "a=b");
    }

    #[test]
    fn export_expands_variable_value() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();

        let source = generate_unique_env_key!();
        let key = generate_unique_env_key!();
        env::set_var(&source, "/opt/quash");
        Export::run(
            &mut shell,
            &[format!("{}=${}/bin", key, source)],
            &mut io::sink(),
        )
        .unwrap();
        assert_eq!(env::var(&key).unwrap(), "/opt/quash/bin");
    }

    #[test]
    fn export_multiple_assignments() {
        let mut shell = Shell::new(ShellConfig::noninteractive()).unwrap();

        let key1 = generate_unique_env_key!();
        let key2 = generate_unique_env_key!();
        Export::run(
            &mut shell,
            &[format!("{}=1", key1), format!("{}=2", key2)],
            &mut io::sink(),
        )
        .unwrap();
        assert_eq!(env::var(&key1).unwrap(), "1");
        assert_eq!(env::var(&key2).unwrap(), "2");
    }
}
