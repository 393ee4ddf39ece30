use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("typerate");
            Some(state_dir.join("results.db"))
        } else {
            ProjectDirs::from("", "", "typerate")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("results.db"))
        }
    }

    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "typerate").map(|proj_dirs| proj_dirs.config_dir().to_path_buf())
    }
}
