use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use log::{debug, error, info};
use ohtanks_platform::{DetachCommand, Platform};
use thiserror::Error;

use crate::local::{LocalVersionStore, is_valid_version_name};

/// Names under which a build's executable and archives are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductNames {
    /// Lower-case executable and archive base name, e.g. `ohtanks`.
    pub executable: String,
    /// Capitalized name used in status text and as the alternate executable
    /// name, e.g. `OhTanks`.
    pub display: String,
}

impl ProductNames {
    #[must_use]
    pub fn new(executable: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            display: display.into(),
        }
    }

    #[must_use]
    pub fn archive_name(&self, version: &str) -> String {
        format!("{}-{version}.zip", self.executable)
    }
}

impl Default for ProductNames {
    fn default() -> Self {
        Self::new("ohtanks", "OhTanks")
    }
}

/// A fully resolved command for starting an installed build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
}

/// Starts a process and gives up ownership of it.
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `command` detached from the caller and return its pid.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    fn spawn_detached(&self, command: &LaunchCommand) -> std::io::Result<u32>;
}

/// Spawns with null standard streams, in a separate process group, and
/// drops the child handle without waiting on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSpawner;

impl ProcessSpawner for DetachedSpawner {
    fn spawn_detached(&self, command: &LaunchCommand) -> std::io::Result<u32> {
        let child = std::process::Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .detach()
            .spawn()?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOutcome {
    pub version: String,
    pub executable: PathBuf,
    pub pid: u32,
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Version {version} not found locally")]
    VersionNotInstalled { version: String },
    #[error("No executable found for version {version}")]
    ExecutableMissing { version: String },
    #[error("Error launching application: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Finds and starts the executable of an installed version.
#[derive(Clone)]
pub struct ExecutableLauncher {
    store: LocalVersionStore,
    product: ProductNames,
    platform: Platform,
    spawner: Arc<dyn ProcessSpawner>,
}

impl ExecutableLauncher {
    #[must_use]
    pub fn new(
        store: LocalVersionStore,
        product: ProductNames,
        spawner: Arc<dyn ProcessSpawner>,
    ) -> Self {
        Self {
            store,
            product,
            platform: Platform::current(),
            spawner,
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn store(&self) -> &LocalVersionStore {
        &self.store
    }

    #[must_use]
    pub fn product(&self) -> &ProductNames {
        &self.product
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Executable names looked up inside a version directory, in order.
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        let names = [&self.product.executable, &self.product.display];
        match self.platform {
            Platform::Windows => names.iter().map(|name| format!("{name}.exe")).collect(),
            Platform::MacOs => names
                .iter()
                .map(|name| format!("{name}.app"))
                .chain(names.iter().map(ToString::to_string))
                .collect(),
            Platform::Linux => names.iter().map(ToString::to_string).collect(),
        }
    }

    /// Path of the executable for `version`.
    ///
    /// # Errors
    /// Returns [`LaunchError::VersionNotInstalled`] when the version
    /// directory is absent and [`LaunchError::ExecutableMissing`] when none
    /// of the candidate names exist in it.
    pub fn locate(&self, version: &str) -> Result<PathBuf, LaunchError> {
        let dir = self.store.version_dir(version);
        if !is_valid_version_name(version) || !dir.is_dir() {
            return Err(LaunchError::VersionNotInstalled {
                version: version.to_string(),
            });
        }

        let found = self
            .candidates()
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists());
        found.ok_or_else(|| {
            debug!("No candidate executable in {}", dir.display());
            LaunchError::ExecutableMissing {
                version: version.to_string(),
            }
        })
    }

    /// Newest of `versions` (sorted newest first) whose executable can be
    /// located, falling back to the newest listed one.
    #[must_use]
    pub fn newest_launchable(&self, versions: &[String]) -> Option<String> {
        versions
            .iter()
            .find(|version| self.locate(version).is_ok())
            .or_else(|| versions.first())
            .cloned()
    }

    /// Start `version` detached and relinquish it.
    ///
    /// No process is spawned unless the executable was found.
    ///
    /// # Errors
    /// Returns an error when the version or its executable is missing, or
    /// the process cannot be spawned.
    pub fn launch(&self, version: &str) -> Result<LaunchOutcome, LaunchError> {
        let executable = self.locate(version)?;
        let command = launch_command(&executable, &self.store.version_dir(version));
        debug!("Launch command: {command:?}");

        let pid = self.spawner.spawn_detached(&command).map_err(|source| {
            error!("Failed to spawn {}: {source}", executable.display());
            LaunchError::Spawn(source)
        })?;

        info!(
            "{} version {version} launched from {} with PID {pid}",
            self.product.display,
            executable.display()
        );
        Ok(LaunchOutcome {
            version: version.to_string(),
            executable,
            pid,
        })
    }
}

fn launch_command(executable: &Path, working_dir: &Path) -> LaunchCommand {
    let is_bundle = executable
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("app"));

    if is_bundle {
        LaunchCommand {
            program: PathBuf::from("open"),
            args: vec![OsString::from("-n"), executable.as_os_str().to_os_string()],
            working_dir: working_dir.to_path_buf(),
        }
    } else {
        LaunchCommand {
            program: executable.to_path_buf(),
            args: Vec::new(),
            working_dir: working_dir.to_path_buf(),
        }
    }
}
