// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the STREAMVAULT_HOME environment variable for isolation.
// When STREAMVAULT_HOME is set, config and data both live under that directory.
// When unset, config uses ~/.streamvault/ and data uses XDG_DATA_HOME/streamvault.

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "streamvault"))
        .as_ref()
}

/// Returns the STREAMVAULT_HOME override, if set.
fn streamvault_home() -> Option<PathBuf> {
    std::env::var_os("STREAMVAULT_HOME").map(PathBuf::from)
}

/// Home directory, or the working directory when no home can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $STREAMVAULT_HOME/ or ~/.streamvault/
pub fn config_dir() -> PathBuf {
    if let Some(home) = streamvault_home() {
        return home;
    }
    dirs_home().join(".streamvault")
}

/// Data directory: $STREAMVAULT_HOME/data/ or ~/.local/share/streamvault/
pub fn data_dir() -> PathBuf {
    if let Some(home) = streamvault_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Database path
pub fn db_path() -> PathBuf {
    data_dir().join("streamvault.db")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
