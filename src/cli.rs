use std::ffi::OsString;
use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::error::ExitRequest;
use crate::interpreter::CommandContext;

pub const TITLE: &str = "Open On-Chip Debugger";
const LICENSE: &str = "Licensed under GNU GPL v2";

const PIPE_COMMAND: &str = "gdb_port pipe; log_output openocd.log";
const PIPE_DEPRECATION: &str =
    "deprecated option: -p/--pipe. Use '-c \"gdb_port pipe; log_output openocd.log\"' instead.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRequirement {
    None,
    /// Takes at most one value; the given default stands in when it is omitted.
    Optional(&'static str),
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagEffect {
    Help,
    Version,
    Debug,
    File,
    Search,
    LogOutput,
    Command,
    Pipe,
}

#[derive(Debug)]
pub struct FlagSpecification {
    pub long_name: &'static str,
    pub short_code: char,
    pub argument: ArgRequirement,
    pub effect: FlagEffect,
    pub help: &'static str,
}

pub const FLAGS: &[FlagSpecification] = &[
    FlagSpecification {
        long_name: "help",
        short_code: 'h',
        argument: ArgRequirement::None,
        effect: FlagEffect::Help,
        help: "display this help",
    },
    FlagSpecification {
        long_name: "version",
        short_code: 'v',
        argument: ArgRequirement::None,
        effect: FlagEffect::Version,
        help: "display OpenOCD version",
    },
    FlagSpecification {
        long_name: "file",
        short_code: 'f',
        argument: ArgRequirement::Required,
        effect: FlagEffect::File,
        help: "use configuration file <name>",
    },
    FlagSpecification {
        long_name: "search",
        short_code: 's',
        argument: ArgRequirement::Required,
        effect: FlagEffect::Search,
        help: "dir to search for config files and scripts",
    },
    FlagSpecification {
        long_name: "debug",
        short_code: 'd',
        argument: ArgRequirement::Optional("3"),
        effect: FlagEffect::Debug,
        help: "set debug level <0-3>",
    },
    FlagSpecification {
        long_name: "log_output",
        short_code: 'l',
        argument: ArgRequirement::Required,
        effect: FlagEffect::LogOutput,
        help: "redirect log output to file <name>",
    },
    FlagSpecification {
        long_name: "command",
        short_code: 'c',
        argument: ArgRequirement::Required,
        effect: FlagEffect::Command,
        help: "run <command>",
    },
    FlagSpecification {
        long_name: "pipe",
        short_code: 'p',
        argument: ArgRequirement::None,
        effect: FlagEffect::Pipe,
        help: "use pipes for gdb communication (deprecated)",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Appended to the config-command queue, run after startup.
    QueueAsConfig,
    /// Sent to the command context while flags are still being read.
    RunImmediately,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredInstruction {
    pub text: String,
    pub mode: Dispatch,
}

impl DeferredInstruction {
    fn queue(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: Dispatch::QueueAsConfig,
        }
    }

    fn run(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: Dispatch::RunImmediately,
        }
    }
}

/// One step of startup, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Instruction(DeferredInstruction),
    SearchDir(PathBuf),
    Warn(&'static str),
}

/// Result of scanning one argument vector.
#[derive(Debug, Default)]
pub struct ParseState {
    pub help_requested: bool,
    pub version_requested: bool,
    pub actions: Vec<Action>,
}

impl FlagSpecification {
    fn arg(&self) -> Arg {
        let arg = Arg::new(self.long_name)
            .long(self.long_name)
            .short(self.short_code)
            .help(self.help);

        match self.argument {
            ArgRequirement::None => arg.action(ArgAction::SetTrue),
            ArgRequirement::Optional(default) => arg
                .action(ArgAction::Append)
                .num_args(0..=1)
                .default_missing_value(default),
            ArgRequirement::Required => arg
                .action(ArgAction::Append)
                .num_args(1)
                .allow_hyphen_values(true),
        }
    }

    fn actions(&self, value: String) -> Vec<Action> {
        match self.effect {
            FlagEffect::Help | FlagEffect::Version => Vec::new(),
            FlagEffect::Debug => vec![Action::Instruction(DeferredInstruction::run(format!(
                "debug_level {value}"
            )))],
            FlagEffect::File => vec![Action::Instruction(DeferredInstruction::queue(format!(
                "script {{{value}}}"
            )))],
            FlagEffect::Search => vec![Action::SearchDir(PathBuf::from(value))],
            FlagEffect::LogOutput => vec![Action::Instruction(DeferredInstruction::run(format!(
                "log_output {value}"
            )))],
            FlagEffect::Command => vec![Action::Instruction(DeferredInstruction::queue(value))],
            FlagEffect::Pipe => vec![
                Action::Instruction(DeferredInstruction::run(PIPE_COMMAND)),
                Action::Warn(PIPE_DEPRECATION),
            ],
        }
    }

    /// Every occurrence on the command line as (argv index, value).
    fn occurrences(&self, matches: &ArgMatches) -> Vec<(usize, String)> {
        if matches.value_source(self.long_name) != Some(ValueSource::CommandLine) {
            return Vec::new();
        }

        match self.argument {
            ArgRequirement::None => matches
                .indices_of(self.long_name)
                .into_iter()
                .flatten()
                .map(|index| (index, String::new()))
                .collect(),
            ArgRequirement::Optional(_) | ArgRequirement::Required => {
                match (
                    matches.indices_of(self.long_name),
                    matches.get_many::<String>(self.long_name),
                ) {
                    (Some(indices), Some(values)) => indices.zip(values.cloned()).collect(),
                    _ => Vec::new(),
                }
            }
        }
    }
}

fn command() -> Command {
    FLAGS.iter().fold(
        Command::new(crate::APP_NAME)
            .about(crate::APP_DESCRIPTION)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .args_override_self(true),
        |command, flag| command.arg(flag.arg()),
    )
}

pub fn banner() -> String {
    format!("{TITLE} {}", crate::APP_VERSION)
}

pub fn usage() -> String {
    let mut text = format!("{TITLE}\n{LICENSE}\n");
    for flag in FLAGS {
        text.push_str(&format!(
            "--{:<11}| -{}\t{}\n",
            flag.long_name, flag.short_code, flag.help
        ));
    }
    text
}

/// Scans `args` (program name first) without touching any collaborator.
pub fn scan<I, T>(args: I) -> Result<ParseState, ExitRequest>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;

    let mut hits: Vec<(usize, &FlagSpecification, String)> = FLAGS
        .iter()
        .flat_map(|flag| {
            flag.occurrences(&matches)
                .into_iter()
                .map(move |(index, value)| (index, flag, value))
        })
        .collect();
    hits.sort_by_key(|(index, _, _)| *index);

    Ok(ParseState {
        help_requested: matches.get_flag("help"),
        version_requested: matches.get_flag("version"),
        actions: hits
            .into_iter()
            .flat_map(|(_, flag, value)| flag.actions(value))
            .collect(),
    })
}

/// Applies the command line to `context` in order. Immediate commands run
/// here, queued ones wait in the config-command list. Help wins over version.
pub fn interpret<I, T, C>(args: I, context: &mut C) -> Result<(), ExitRequest>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    C: CommandContext + ?Sized,
{
    let state = scan(args)?;

    for action in &state.actions {
        match action {
            Action::Instruction(DeferredInstruction {
                text,
                mode: Dispatch::RunImmediately,
            }) => {
                if let Err(err) = context.run_line(text) {
                    tracing::error!("{text}: {err}");
                }
            }
            Action::Instruction(DeferredInstruction {
                text,
                mode: Dispatch::QueueAsConfig,
            }) => context.add_config_command(text),
            Action::SearchDir(dir) => context.add_search_dir(dir),
            Action::Warn(message) => context.warn(message),
        }
    }

    if state.help_requested {
        context.output(&usage());
        return Err(ExitRequest::Help);
    }
    if state.version_requested {
        return Err(ExitRequest::Version);
    }
    Ok(())
}
