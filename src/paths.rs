use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;

pub struct AppPaths {
    pub base: PathBuf,
    /// Key-value store used by the look repository.
    pub store: PathBuf,
    /// Default destination for downloaded exports.
    pub exports: PathBuf,
    pub config_file: PathBuf,
}

impl AppPaths {
    pub fn from_project_dirs() -> Option<Self> {
        ProjectDirs::from("com", "lookboard", "Lookboard").map(|dirs| {
            let base = dirs.data_dir().to_path_buf();
            let store = base.join("store");
            let exports = base.join("exports");
            let config_file = dirs.config_dir().join("config.json");

            Self {
                base,
                store,
                exports,
                config_file,
            }
        })
    }

    pub fn ensure_dirs_exist(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.store)?;
        fs::create_dir_all(&self.exports)?;
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}
