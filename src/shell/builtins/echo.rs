use crate::core::variable_expansion;
use crate::shell::builtins::{self, prelude::*};

pub struct Echo;

impl builtins::BuiltinCommand for Echo {
    const NAME: &'static str = builtins::ECHO_NAME;

    const HELP: &'static str = "\
echo: echo [arg ...]
    Write arguments to the standard output, separated by single spaces and
    followed by a newline.

    An argument starting with a single or double quote begins a quoted run,
    which ends at the next argument ending with the same quote. The quotes
    are removed and variables inside the run are not expanded.";

    fn run<T: AsRef<str>>(_shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let line = echo_line(args)?;
        writeln!(stdout, "{}", line).context(ErrorKind::Io)?;
        Ok(())
    }
}

fn echo_line<T: AsRef<str>>(args: &[T]) -> Result<String> {
    let mut pieces = Vec::with_capacity(args.len());
    let mut words = args.iter().map(AsRef::as_ref);

    while let Some(word) = words.next() {
        let quote = match word.chars().next() {
            Some(c @ '\'') | Some(c @ '"') => c,
            _ => {
                pieces.push(variable_expansion::expand(word)?);
                continue;
            }
        };

        let mut run = vec![&word[1..]];
        let closed = word.len() > 1 && word.ends_with(quote);
        if !closed {
            for next in &mut words {
                run.push(next);
                if next.ends_with(quote) {
                    break;
                }
            }
        }

        let mut text = run.join(" ");
        if text.ends_with(quote) {
            text.pop();
        }
        pieces.push(text);
    }

    Ok(pieces.join(" "))
}
