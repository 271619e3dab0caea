use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, Registry};

/// Level used until a `debug_level` command changes it.
pub const DEFAULT_DEBUG_LEVEL: u8 = 2;

pub type LevelHandle = reload::Handle<LevelFilter, Registry>;

enum Target {
    Stderr,
    File(File),
    #[cfg(test)]
    Memory(Vec<u8>),
}

/// Destination shared by log records and user-facing output. `log_output`
/// swaps it at runtime, so everything written afterwards follows.
#[derive(Clone)]
pub struct LogSink {
    target: Arc<Mutex<Target>>,
}

impl LogSink {
    pub fn stderr() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Stderr)),
        }
    }

    /// Redirects to `path`, truncating any existing file.
    pub fn redirect(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        *self.lock() = Target::File(file);
        Ok(())
    }

    pub fn restore(&self) {
        *self.lock() = Target::Stderr;
    }

    fn lock(&self) -> MutexGuard<'_, Target> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn memory() -> Self {
        Self {
            target: Arc::new(Mutex::new(Target::Memory(Vec::new()))),
        }
    }

    #[cfg(test)]
    pub fn contents(&self) -> String {
        match &*self.lock() {
            Target::Memory(buf) => String::from_utf8_lossy(buf).into_owned(),
            _ => String::new(),
        }
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut *self.lock() {
            Target::Stderr => io::stderr().write(buf),
            Target::File(file) => file.write(buf),
            #[cfg(test)]
            Target::Memory(mem) => mem.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut *self.lock() {
            Target::Stderr => io::stderr().flush(),
            Target::File(file) => file.flush(),
            #[cfg(test)]
            Target::Memory(_) => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Maps the console's 0..=4 debug levels onto tracing levels.
pub fn level_filter(level: u8) -> LevelFilter {
    match level {
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber writing through `sink` and returns the
/// handle used to change its level later.
pub fn init(sink: LogSink) -> LevelHandle {
    let (filter, handle) = reload::Layer::new(level_filter(DEFAULT_DEBUG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(sink)
                .with_ansi(false)
                .with_target(false)
                .without_time(),
        )
        .init();

    handle
}
