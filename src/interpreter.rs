use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::mem;
use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::error::CommandError;
use crate::log::{self, LevelHandle, LogSink};

const MAX_SCRIPT_DEPTH: usize = 16;

/// What argument interpretation needs from the command layer.
pub trait CommandContext {
    /// Runs one line of commands synchronously.
    fn run_line(&mut self, line: &str) -> Result<(), CommandError>;

    fn add_search_dir(&mut self, dir: &Path);

    /// Queues a command for the script loader; it is not run here.
    fn add_config_command(&mut self, command: &str);

    /// User-facing output, written without log decoration.
    fn output(&mut self, text: &str);

    fn warn(&mut self, message: &str) {
        tracing::warn!("{message}");
    }
}

/// The line-oriented command console the binary runs on.
pub struct Console {
    config: Configuration,
    sink: LogSink,
    levels: Option<LevelHandle>,
    debug_level: u8,
    gdb_port: Option<String>,
    depth: usize,
    shutdown: bool,
}

impl Console {
    pub fn new(sink: LogSink, levels: Option<LevelHandle>) -> Self {
        Self {
            config: Configuration::new(),
            sink,
            levels,
            debug_level: log::DEFAULT_DEBUG_LEVEL,
            gdb_port: None,
            depth: 0,
            shutdown: false,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level
    }

    pub fn gdb_port(&self) -> Option<&str> {
        self.gdb_port.as_deref()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }

    /// Runs the queued startup commands in order, stopping at the first failure.
    pub fn run_config_commands(&mut self) -> Result<(), CommandError> {
        for command in self.config.take_config_commands() {
            if self.shutdown {
                break;
            }
            self.run_line(&command)?;
        }
        Ok(())
    }

    fn execute(&mut self, words: &[String]) -> Result<(), CommandError> {
        let Some((name, args)) = words.split_first() else {
            return Ok(());
        };

        match name.as_str() {
            "debug_level" => match args {
                [] => {}
                [level] => self.set_debug_level(level)?,
                _ => return Err(CommandError::Usage("debug_level [0-4]")),
            },
            "log_output" => match args {
                [] => self.sink.restore(),
                [path] => self.sink.redirect(Path::new(path)).map_err(|source| CommandError::Io {
                    path: PathBuf::from(path),
                    source,
                })?,
                _ => return Err(CommandError::Usage("log_output [file_name]")),
            },
            "gdb_port" => match args {
                [] => {
                    let port = self.gdb_port.clone().unwrap_or_else(|| "3333".to_string());
                    self.output(&format!("{port}\n"));
                }
                [port] => {
                    tracing::debug!("gdb port set to {port}");
                    self.gdb_port = Some(port.clone());
                }
                _ => return Err(CommandError::Usage("gdb_port [port_num|pipe|disabled]")),
            },
            "script" => match args {
                [file] => self.run_script(file)?,
                _ => return Err(CommandError::Usage("script <file>")),
            },
            "add_script_search_dir" => match args {
                [dir] => self.add_search_dir(Path::new(dir)),
                _ => return Err(CommandError::Usage("add_script_search_dir <directory>")),
            },
            "echo" => {
                let text = args.join(" ");
                self.output(&format!("{text}\n"));
            }
            "version" => {
                let banner = crate::cli::banner();
                self.output(&format!("{banner}\n"));
            }
            "shutdown" => {
                self.output("shutdown command invoked\n");
                self.shutdown = true;
            }
            _ => return Err(CommandError::Unknown(name.clone())),
        }
        Ok(())
    }

    fn set_debug_level(&mut self, level: &str) -> Result<(), CommandError> {
        let parsed = level
            .parse::<u8>()
            .ok()
            .filter(|l| *l <= 4)
            .ok_or_else(|| CommandError::InvalidLevel(level.to_string()))?;

        self.debug_level = parsed;
        if let Some(handle) = &self.levels {
            if let Err(err) = handle.modify(|filter| *filter = log::level_filter(parsed)) {
                tracing::warn!("cannot change log level: {err}");
            }
        }
        self.output(&format!("debug_level: {parsed}\n"));
        Ok(())
    }

    fn run_script(&mut self, name: &str) -> Result<(), CommandError> {
        if self.depth >= MAX_SCRIPT_DEPTH {
            return Err(CommandError::NestingTooDeep(MAX_SCRIPT_DEPTH));
        }
        let path = self
            .config
            .find_script(name)
            .ok_or_else(|| CommandError::ScriptNotFound(name.to_string()))?;
        let file = File::open(&path).map_err(|source| CommandError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("script: {}", path.display());

        self.depth += 1;
        let result = self.run_script_lines(BufReader::new(file), &path);
        self.depth -= 1;
        result
    }

    fn run_script_lines<R: BufRead>(&mut self, reader: R, path: &Path) -> Result<(), CommandError> {
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| CommandError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            self.run_line(line).map_err(|source| CommandError::InScript {
                script: path.to_path_buf(),
                line: index + 1,
                source: Box::new(source),
            })?;
            if self.shutdown {
                break;
            }
        }
        Ok(())
    }
}

impl CommandContext for Console {
    fn run_line(&mut self, line: &str) -> Result<(), CommandError> {
        for words in parse_line(line)? {
            self.execute(&words)?;
            if self.shutdown {
                break;
            }
        }
        Ok(())
    }

    fn add_search_dir(&mut self, dir: &Path) {
        self.config.add_search_dir(dir);
    }

    fn add_config_command(&mut self, command: &str) {
        self.config.add_config_command(command);
    }

    fn output(&mut self, text: &str) {
        let _ = self.sink.write_all(text.as_bytes());
        let _ = self.sink.flush();
    }
}

/// Splits a line into commands (separated by `;`) and each command into
/// words. `{...}` and `"..."` group a single word; braces nest. A `#` where a
/// command would start comments out the rest of the line.
fn parse_line(line: &str) -> Result<Vec<Vec<String>>, CommandError> {
    let mut commands = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut depth = 0usize;
    let mut quoted = false;

    fn end_word(words: &mut Vec<String>, word: &mut String, in_word: &mut bool) {
        if *in_word {
            words.push(mem::take(word));
            *in_word = false;
        }
    }

    for ch in line.chars() {
        match ch {
            '#' if depth == 0 && !quoted && !in_word && words.is_empty() => break,
            '{' if !quoted => {
                if depth > 0 {
                    word.push(ch);
                }
                depth += 1;
                in_word = true;
            }
            '}' if !quoted && depth > 0 => {
                depth -= 1;
                if depth > 0 {
                    word.push(ch);
                }
            }
            '"' if depth == 0 => {
                quoted = !quoted;
                in_word = true;
            }
            ';' if depth == 0 && !quoted => {
                end_word(&mut words, &mut word, &mut in_word);
                if !words.is_empty() {
                    commands.push(mem::take(&mut words));
                }
            }
            c if c.is_whitespace() && depth == 0 && !quoted => {
                end_word(&mut words, &mut word, &mut in_word);
            }
            c => {
                word.push(c);
                in_word = true;
            }
        }
    }

    if depth > 0 {
        return Err(CommandError::Syntax("missing close-brace"));
    }
    if quoted {
        return Err(CommandError::Syntax("missing \""));
    }
    end_word(&mut words, &mut word, &mut in_word);
    if !words.is_empty() {
        commands.push(words);
    }
    Ok(commands)
}

pub fn interactive(console: &mut Console) -> Result<(), CommandError> {
    let stdin = io::stdin();
    run_with_reader(console, stdin.lock(), true)
}

/// Feeds lines from `reader` to the console until EOF or `shutdown`.
/// Interactive sessions report failures and carry on; otherwise the first
/// failure ends the run.
pub fn run_with_reader<R: BufRead>(
    console: &mut Console,
    mut reader: R,
    interactive: bool,
) -> Result<(), CommandError> {
    while !console.shutdown_requested() {
        if interactive {
            print!("> ");
            let _ = io::stdout().flush();
        }

        let mut input_line = String::new();
        let read = reader.read_line(&mut input_line).map_err(|source| CommandError::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        if read == 0 {
            break; // EOF
        }

        let effective_line = input_line.trim();
        if effective_line.is_empty() {
            continue;
        }

        if let Err(err) = console.run_line(effective_line) {
            if interactive {
                tracing::error!("{err}");
            } else {
                return Err(err);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;

    fn console() -> (Console, LogSink) {
        let sink = LogSink::memory();
        (Console::new(sink.clone(), None), sink)
    }

    #[test]
    fn test_parse_line_splits_commands_and_groups_braces() {
        let commands = parse_line("gdb_port pipe; log_output openocd.log").unwrap();
        assert_eq!(
            commands,
            vec![vec!["gdb_port", "pipe"], vec!["log_output", "openocd.log"]]
        );

        let commands = parse_line("script {my board.cfg}").unwrap();
        assert_eq!(commands, vec![vec!["script", "my board.cfg"]]);

        let commands = parse_line("echo {a {b} c}; echo \"x; y\"").unwrap();
        assert_eq!(commands, vec![vec!["echo", "a {b} c"], vec!["echo", "x; y"]]);
    }

    #[test]
    fn test_parse_line_comments_and_errors() {
        assert!(parse_line("# just a comment").unwrap().is_empty());
        assert!(parse_line("   ").unwrap().is_empty());
        assert!(matches!(parse_line("script {a.cfg"), Err(CommandError::Syntax(_))));
        assert!(matches!(parse_line("echo \"open"), Err(CommandError::Syntax(_))));
    }

    #[test]
    fn test_echo_and_version() {
        let (mut console, sink) = console();
        console.run_line("echo hello world; version").unwrap();
        assert_eq!(
            sink.contents(),
            format!("hello world\n{}\n", crate::cli::banner())
        );
    }

    #[test]
    fn test_debug_level() {
        let (mut console, sink) = console();
        console.run_line("debug_level 3").unwrap();
        assert_eq!(console.debug_level(), 3);
        assert_eq!(sink.contents(), "debug_level: 3\n");

        assert!(matches!(
            console.run_line("debug_level 9"),
            Err(CommandError::InvalidLevel(_))
        ));
        assert!(matches!(
            console.run_line("debug_level x"),
            Err(CommandError::InvalidLevel(_))
        ));
        assert_eq!(console.debug_level(), 3);
    }

    #[test]
    fn test_gdb_port_and_log_output() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("openocd.log");

        let (mut console, sink) = console();
        console
            .run_line(&format!("gdb_port pipe; log_output {}", log_path.display()))
            .unwrap();
        assert_eq!(console.gdb_port(), Some("pipe"));

        console.run_line("echo after").unwrap();
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "after\n");
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_unknown_command() {
        let (mut console, _) = console();
        let err = console.run_line("reset halt").unwrap_err();
        assert!(matches!(err, CommandError::Unknown(name) if name == "reset"));
    }

    #[test]
    fn test_script_resolved_through_search_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("interface")).unwrap();
        fs::write(
            dir.path().join("interface/dummy.cfg"),
            "# dummy adapter\necho adapter\n\nscript {target.cfg}\n",
        )
        .unwrap();
        fs::write(dir.path().join("target.cfg"), "echo target\n").unwrap();

        let (mut console, sink) = console();
        console.add_search_dir(dir.path());
        console.run_line("script interface/dummy.cfg").unwrap();
        assert_eq!(sink.contents(), "adapter\ntarget\n");
    }

    #[test]
    fn test_script_errors_carry_location() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.cfg"), "echo ok\nbogus\n").unwrap();

        let (mut console, _) = console();
        console.add_search_dir(dir.path());
        let err = console.run_line("script bad.cfg").unwrap_err();
        match err {
            CommandError::InScript { script, line, source } => {
                assert_eq!(script, dir.path().join("bad.cfg"));
                assert_eq!(line, 2);
                assert!(matches!(*source, CommandError::Unknown(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            console.run_line("script missing.cfg"),
            Err(CommandError::ScriptNotFound(_))
        ));
    }

    #[test]
    fn test_recursive_script_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loop.cfg"), "script loop.cfg\n").unwrap();

        let (mut console, _) = console();
        console.add_search_dir(dir.path());
        fn innermost(err: CommandError) -> CommandError {
            match err {
                CommandError::InScript { source, .. } => innermost(*source),
                other => other,
            }
        }

        let err = innermost(console.run_line("script loop.cfg").unwrap_err());
        assert!(matches!(err, CommandError::NestingTooDeep(MAX_SCRIPT_DEPTH)));
    }

    #[test]
    fn test_config_commands_run_in_order_until_shutdown() {
        let (mut console, sink) = console();
        console.add_config_command("echo first");
        console.add_config_command("echo second; shutdown; echo skipped");
        console.add_config_command("echo never");

        console.run_config_commands().unwrap();
        assert!(console.shutdown_requested());
        assert_eq!(sink.contents(), "first\nsecond\nshutdown command invoked\n");
        assert!(console.config().config_commands().is_empty());
    }

    #[test]
    fn test_run_with_reader_stops_on_error_when_not_interactive() {
        let (mut console, sink) = console();
        let input = Cursor::new("echo one\nbogus\necho two\n");
        let err = run_with_reader(&mut console, input, false).unwrap_err();
        assert!(matches!(err, CommandError::Unknown(_)));
        assert_eq!(sink.contents(), "one\n");
    }

    #[test]
    fn test_run_with_reader_stops_at_shutdown() {
        let (mut console, sink) = console();
        let input = Cursor::new("echo one\nshutdown\necho two\n");
        run_with_reader(&mut console, input, false).unwrap();
        assert_eq!(sink.contents(), "one\nshutdown command invoked\n");
    }
}
