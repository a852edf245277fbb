use log::debug;
use serde::Deserialize;

use crate::shell::builtins::{self, prelude::*};

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    flag_p: bool,
}

const USAGE: &str = "
Usage: jobs [-p]

Options:
    -p      lists process IDs only
";

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: jobs [-p]
    Display status of jobs.

    Lists the running background jobs as [ID] PID COMMAND. With -p, only
    process IDs are listed.

    Exit Status:
    Returns success unless an invalid option is given or an error occurs.";

    fn run<T: AsRef<str>>(shell: &mut Shell, args: &[T], stdout: &mut dyn Write) -> Result<()> {
        let args: JobsArgs = parse_args(USAGE, Self::NAME, args.iter().map(AsRef::as_ref))?;
        debug!("{:?}", args);

        for job in shell.jobs().list() {
            if args.flag_p {
                writeln!(stdout, "{}", job.pid()).context(ErrorKind::Io)?;
            } else {
                writeln!(stdout, "{}", job).context(ErrorKind::Io)?;
            }
        }

        Ok(())
    }
}
