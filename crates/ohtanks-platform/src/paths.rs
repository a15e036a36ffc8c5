use std::path::PathBuf;
use thiserror::Error;

const APP_DIR_NAME: &str = "ohtanks-launcher";
const VERSIONS_DIR_NAME: &str = "versions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppPathsError {
    #[error("Could not determine home directory")]
    HomeDirUnavailable,
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
    #[error("Could not determine working directory")]
    WorkingDirUnavailable,
}

pub struct AppPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub versions_dir: PathBuf,
}

impl AppPaths {
    /// Build application paths for the current platform.
    ///
    /// Installed builds live under `<working-directory>/versions`, next to
    /// the launcher; settings and logs go to the per-user directories.
    ///
    /// # Errors
    /// Returns an error when a required base directory (for example the user
    /// home/config/data directory, or the working directory) cannot be
    /// determined.
    pub fn new() -> Result<Self, AppPathsError> {
        let versions_dir = std::env::current_dir()
            .map_err(|_| AppPathsError::WorkingDirUnavailable)?
            .join(VERSIONS_DIR_NAME);

        #[cfg(target_os = "macos")]
        {
            let home = dirs::home_dir().ok_or(AppPathsError::HomeDirUnavailable)?;
            Ok(Self {
                config_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
                data_dir: home.join("Library/Application Support").join(APP_DIR_NAME),
                versions_dir,
            })
        }

        #[cfg(not(target_os = "macos"))]
        {
            Ok(Self {
                config_dir: dirs::config_dir()
                    .ok_or(AppPathsError::ConfigDirUnavailable)?
                    .join(APP_DIR_NAME),
                data_dir: dirs::data_dir()
                    .ok_or(AppPathsError::DataDirUnavailable)?
                    .join(APP_DIR_NAME),
                versions_dir,
            })
        }
    }

    #[must_use]
    pub fn with_versions_dir(mut self, versions_dir: PathBuf) -> Self {
        self.versions_dir = versions_dir;
        self
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("debug.log")
    }

    #[must_use]
    pub fn instance_lock_file(&self) -> PathBuf {
        self.data_dir.join("instance.lock")
    }

    /// Ensure the config and data directories exist on disk.
    ///
    /// The versions root is created lazily by the installer.
    ///
    /// # Errors
    /// Returns an error if any directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
