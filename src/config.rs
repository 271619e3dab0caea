use std::path::{Path, PathBuf};

/// Process-wide startup configuration: where scripts are looked up and which
/// commands run once startup is complete.
#[derive(Debug, Default)]
pub struct Configuration {
    search_dirs: Vec<PathBuf>,
    config_commands: Vec<String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a directory. Earlier directories are searched first.
    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.push(dir.into());
    }

    pub fn add_config_command(&mut self, command: impl Into<String>) {
        self.config_commands.push(command.into());
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    pub fn config_commands(&self) -> &[String] {
        &self.config_commands
    }

    /// Hands the queued commands over for execution, leaving the queue empty.
    pub fn take_config_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.config_commands)
    }

    /// Resolves a script name. Absolute paths and paths that exist relative to
    /// the working directory are used as given; otherwise the first search
    /// directory holding the file wins.
    pub fn find_script(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() || direct.is_file() {
            return direct.is_file().then(|| direct.to_path_buf());
        }

        self.search_dirs
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_script_prefers_earlier_dirs() {
        let user = tempfile::tempdir().unwrap();
        let vendor = tempfile::tempdir().unwrap();
        fs::create_dir(user.path().join("target")).unwrap();
        fs::create_dir(vendor.path().join("target")).unwrap();
        fs::write(user.path().join("target/stm32.cfg"), "echo user\n").unwrap();
        fs::write(vendor.path().join("target/stm32.cfg"), "echo vendor\n").unwrap();

        let mut config = Configuration::new();
        config.add_search_dir(user.path());
        config.add_search_dir(vendor.path());

        assert_eq!(
            config.find_script("target/stm32.cfg"),
            Some(user.path().join("target/stm32.cfg"))
        );
    }

    #[test]
    fn test_find_script_skips_missing_dirs() {
        let vendor = tempfile::tempdir().unwrap();
        fs::write(vendor.path().join("board.cfg"), "").unwrap();

        let mut config = Configuration::new();
        config.add_search_dir("/nonexistent/openocd/scripts");
        config.add_search_dir(vendor.path());

        assert_eq!(config.find_script("board.cfg"), Some(vendor.path().join("board.cfg")));
        assert_eq!(config.find_script("missing.cfg"), None);
    }

    #[test]
    fn test_absolute_script_path_is_used_as_given() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("init.cfg");
        fs::write(&script, "").unwrap();

        let config = Configuration::new();
        assert_eq!(config.find_script(script.to_str().unwrap()), Some(script.clone()));
        assert_eq!(config.find_script(dir.path().join("none.cfg").to_str().unwrap()), None);
    }

    #[test]
    fn test_take_config_commands_drains_queue() {
        let mut config = Configuration::new();
        config.add_config_command("script {a.cfg}");
        config.add_config_command("init");

        assert_eq!(config.take_config_commands(), vec!["script {a.cfg}", "init"]);
        assert!(config.config_commands().is_empty());
    }
}
