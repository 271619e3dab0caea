//! Default script search directories.
//!
//! Directories given with `-s` are registered while the command line is read;
//! the ones here are appended afterwards, so user locations always win over
//! what ships with the installation.

use std::env;
use std::path::{Path, PathBuf};

use crate::interpreter::CommandContext;

/// Data root baked in at build time.
pub const PKGDATADIR: &str = match option_env!("OPENOCD_PKGDATADIR") {
    Some(dir) => dir,
    None => "/usr/local/share/openocd",
};

/// Where an installation keeps its scripts.
pub trait SearchLayout {
    /// Candidate directories in search order. Existence is not checked.
    fn default_dirs(&self) -> Vec<PathBuf>;
}

/// Scripts located relative to the running executable:
///
/// ```text
/// bin/openocd.exe
/// interface/...                      (parent of bin)
/// share/openocd/scripts/interface/... (make install layout)
/// scripts/interface/...               (standalone builds)
/// ```
#[derive(Debug, Clone)]
pub struct InstallRelative {
    exe_dir: Option<PathBuf>,
}

impl InstallRelative {
    pub fn new(exe_dir: Option<PathBuf>) -> Self {
        Self { exe_dir }
    }

    pub fn from_current_exe() -> Self {
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::new(exe_dir)
    }
}

impl SearchLayout for InstallRelative {
    fn default_dirs(&self) -> Vec<PathBuf> {
        let Some(exe_dir) = &self.exe_dir else {
            return Vec::new();
        };
        let parent = exe_dir.join("..");
        vec![
            parent.clone(),
            parent.join("share").join(crate::APP_NAME).join("scripts"),
            parent.join("scripts"),
        ]
    }
}

/// Per-user directory under `$HOME`, then the site and bundled script
/// directories under the data root.
#[derive(Debug, Clone)]
pub struct Posix {
    home: Option<PathBuf>,
    data_root: PathBuf,
}

impl Posix {
    pub fn new(home: Option<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            home,
            data_root: data_root.into(),
        }
    }

    pub fn from_env() -> Self {
        let home = env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(PathBuf::from);
        Self::new(home, PKGDATADIR)
    }
}

impl SearchLayout for Posix {
    fn default_dirs(&self) -> Vec<PathBuf> {
        self.home
            .iter()
            .map(|home| home.join(format!(".{}", crate::APP_NAME)))
            .chain([self.data_root.join("site"), self.data_root.join("scripts")])
            .collect()
    }
}

/// The layout this build uses.
pub fn platform_layout() -> Box<dyn SearchLayout> {
    #[cfg(windows)]
    {
        Box::new(InstallRelative::from_current_exe())
    }

    #[cfg(not(windows))]
    {
        Box::new(Posix::from_env())
    }
}

pub fn register_default_search_paths<C>(context: &mut C, layout: &dyn SearchLayout)
where
    C: CommandContext + ?Sized,
{
    for dir in layout.default_dirs() {
        tracing::debug!("script search dir: {}", dir.display());
        context.add_search_dir(&dir);
    }
}
