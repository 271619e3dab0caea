use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the command console.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command name \"{0}\"")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("syntax error: {0}")]
    Syntax(&'static str),

    #[error("invalid debug level \"{0}\", expected 0 to 4")]
    InvalidLevel(String),

    #[error("can't find {0}")]
    ScriptNotFound(String),

    #[error("script nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}:{line}: {source}", .script.display())]
    InScript {
        script: PathBuf,
        line: usize,
        #[source]
        source: Box<CommandError>,
    },
}

/// Ways argument interpretation stops the process before startup continues.
#[derive(Debug, Error)]
pub enum ExitRequest {
    #[error("help requested")]
    Help,

    #[error("version requested")]
    Version,

    #[error(transparent)]
    Malformed(#[from] clap::Error),
}

impl ExitRequest {
    /// Process status for this request. Help keeps the legacy `exit(-1)`.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExitRequest::Help => 255,
            ExitRequest::Version => 0,
            ExitRequest::Malformed(err) => u8::try_from(err.exit_code()).unwrap_or(1),
        }
    }
}
