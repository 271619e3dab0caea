use std::ffi::OsString;
use std::process::ExitCode;

use anyhow::Context;

mod cli;
mod config;
mod error;
mod interpreter;
mod log;
mod search_path;

use error::ExitRequest;
use interpreter::{CommandContext, Console};
use search_path::SearchLayout;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn main() -> ExitCode {
    let sink = log::LogSink::stderr();
    let levels = log::init(sink.clone());

    if let Err(err) = ctrlc::set_handler(|| {
        println!("\nCtrl-C pressed. Exiting...");
        std::process::exit(0);
    }) {
        tracing::warn!("cannot install Ctrl-C handler: {err}");
    }

    let mut console = Console::new(sink, Some(levels));
    console.output(&format!("{}\n", cli::banner()));

    let layout = search_path::platform_layout();
    if let Err(exit) = startup(std::env::args_os(), &mut console, layout.as_ref()) {
        if let ExitRequest::Malformed(err) = &exit {
            let _ = err.print();
        }
        return ExitCode::from(exit.exit_code());
    }

    match run(&mut console) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Reads the command line, then registers the default search directories.
/// The defaults are skipped when the command line asks to exit.
fn startup<I, T, C>(args: I, context: &mut C, layout: &dyn SearchLayout) -> Result<(), ExitRequest>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    C: CommandContext + ?Sized,
{
    cli::interpret(args, context)?;
    search_path::register_default_search_paths(context, layout);
    Ok(())
}

fn run(console: &mut Console) -> anyhow::Result<()> {
    console
        .run_config_commands()
        .context("startup commands failed")?;

    if !console.shutdown_requested() {
        interpreter::interactive(console).context("console input failed")?;
    }
    Ok(())
}
