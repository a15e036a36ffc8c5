use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::download::ArchiveFetcher;
use crate::extract::extract_archive_in_background;
use crate::launch::{ExecutableLauncher, LaunchOutcome};
use crate::local::{LocalVersionStore, is_valid_version_name};
use crate::registry::{RegistryResolver, Release};
use crate::status::StatusReporter;

/// How long the launcher stays open after starting a build, so the final
/// status line can be read.
pub const CLOSE_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ResolvingRemote,
    DownloadingAndExtracting,
    Launching,
    Done,
}

impl RunState {
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunState::ResolvingRemote | RunState::DownloadingAndExtracting | RunState::Launching
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Download,
    Extraction,
    Launch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Launched(LaunchOutcome),
    /// Nothing installed locally and nothing resolvable remotely.
    NothingAvailable,
    Failed(FailureStage),
    /// A previous run was still in flight; this trigger was ignored.
    AlreadyRunning,
}

impl RunOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }
}

/// Runs the update-or-launch workflow once per "ready" trigger.
pub struct UpdateOrchestrator {
    store: LocalVersionStore,
    registry: Arc<dyn RegistryResolver>,
    fetcher: Arc<dyn ArchiveFetcher>,
    launcher: ExecutableLauncher,
    status: StatusReporter,
    close_delay: Duration,
    state: Mutex<RunState>,
}

struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = RunState::Done;
    }
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(
        launcher: ExecutableLauncher,
        registry: Arc<dyn RegistryResolver>,
        fetcher: Arc<dyn ArchiveFetcher>,
        status: StatusReporter,
    ) -> Self {
        Self {
            store: launcher.store().clone(),
            registry,
            fetcher,
            launcher,
            status,
            close_delay: CLOSE_DELAY,
            state: Mutex::new(RunState::Idle),
        }
    }

    #[must_use]
    pub fn with_close_delay(mut self, close_delay: Duration) -> Self {
        self.close_delay = close_delay;
        self
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle one "UI is ready" trigger.
    ///
    /// Every failure is logged and reported on the status channel; none of
    /// them propagate. A trigger that arrives while a run is active returns
    /// [`RunOutcome::AlreadyRunning`] without doing anything.
    pub async fn run(&self) -> RunOutcome {
        let Some(_guard) = self.begin_run() else {
            warn!("Update already in progress, ignoring trigger");
            self.status.send("An update is already in progress");
            return RunOutcome::AlreadyRunning;
        };

        let outcome = self.run_pipeline().await;
        info!("Update run finished: {outcome:?}");
        outcome
    }

    fn begin_run(&self) -> Option<RunGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_active() {
            return None;
        }
        *state = RunState::ResolvingRemote;
        Some(RunGuard { state: &self.state })
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    async fn run_pipeline(&self) -> RunOutcome {
        let local = self.store.list();
        info!("Found local versions: {local:?}");

        match self.resolve_remote().await {
            Some(release) => self.update_or_launch(&release, &local).await,
            None => self.launch_newest_local(&local).await,
        }
    }

    async fn resolve_remote(&self) -> Option<Release> {
        self.status.send("Checking latest version. Please wait ...");
        let platform = self.launcher.platform();

        match self.registry.resolve_latest(platform).await {
            Ok(Some(release)) => {
                info!("Latest remote version: {release:?}");
                Some(release)
            }
            Ok(None) => {
                info!(
                    "Registry has no versions for platform {platform} ({})",
                    platform.display_name()
                );
                self.status.send("No versions available for your platform");
                None
            }
            Err(error) => {
                error!("Error fetching latest version: {error}");
                self.status.send("Error checking latest version");
                None
            }
        }
    }

    async fn update_or_launch(&self, release: &Release, local: &[String]) -> RunOutcome {
        let version = release.version.as_str();
        let listed = local.iter().any(|v| v == version);
        let launchable = listed
            && match self.launcher.locate(version) {
                Ok(_) => true,
                Err(error) => {
                    warn!("Local copy of version {version} is unusable: {error}");
                    false
                }
            };

        if launchable {
            if !self.store.is_complete(version) {
                debug!("Version {version} has no install marker, using it as is");
            }
            info!("Latest version {version} already available locally");
            self.status.send(format!("Using local version {version}"));
        } else {
            if listed {
                warn!("Version {version} is present but has no executable, reinstalling");
            } else {
                info!("Latest version {version} not found locally. Downloading...");
            }
            self.status.send(format!("Downloading version {version}..."));
            if let Err(outcome) = self.install(release).await {
                return outcome;
            }
        }

        self.launch_version(version).await
    }

    async fn launch_newest_local(&self, local: &[String]) -> RunOutcome {
        let Some(version) = self.launcher.newest_launchable(local) else {
            info!("No versions available locally or remotely");
            self.status
                .send("No versions available. Please check your connection.");
            return RunOutcome::NothingAvailable;
        };

        info!("No remote version available, launching latest local version: {version}");
        self.status
            .send(format!("Launching local version {version}..."));
        self.launch_version(&version).await
    }

    async fn install(&self, release: &Release) -> Result<(), RunOutcome> {
        self.set_state(RunState::DownloadingAndExtracting);
        let version = release.version.as_str();
        let product = self.launcher.product();

        if !is_valid_version_name(version) {
            return Err(self.fail(
                FailureStage::Download,
                format!("Error downloading version: invalid version name '{version}'"),
            ));
        }

        let root = self.store.root();
        if let Err(error) = tokio::fs::create_dir_all(root).await {
            return Err(self.fail(
                FailureStage::Download,
                format!(
                    "Error downloading version: failed to create {}: {error}",
                    root.display()
                ),
            ));
        }

        let archive_name = product.archive_name(version);
        let archive_path = root.join(&archive_name);
        info!("Downloading version {version} from: {}", release.download_url);
        self.status
            .send(format!("Preparing to download version {version}..."));

        let archive = match self.fetcher.fetch(release, &archive_path, &self.status).await {
            Ok(archive) => archive,
            Err(error) => {
                return Err(self.fail(
                    FailureStage::Download,
                    format!("Error downloading version: {error}"),
                ));
            }
        };
        info!(
            "Download completed: {} ({} bytes via {})",
            archive.path.display(),
            archive.bytes,
            archive.strategy
        );
        self.status
            .send(format!("Version {version} downloaded successfully!"));

        let staging = self.store.staging_dir(version);
        if let Err(error) = reset_dir(&staging).await {
            return Err(self.fail(
                FailureStage::Extraction,
                format!("Error extracting files: {error}"),
            ));
        }

        self.status.send(format!("Extracting {archive_name}..."));
        if let Err(error) =
            extract_archive_in_background(&archive.path, &staging, &self.status).await
        {
            discard_dir(&staging).await;
            return Err(self.fail(
                FailureStage::Extraction,
                format!("Error extracting files: {error}"),
            ));
        }

        let version_dir = self.store.version_dir(version);
        if let Err(error) = replace_dir(&staging, &version_dir).await {
            discard_dir(&staging).await;
            return Err(self.fail(
                FailureStage::Extraction,
                format!(
                    "Error extracting files: failed to move files into {}: {error}",
                    version_dir.display()
                ),
            ));
        }

        match tokio::fs::remove_file(&archive.path).await {
            Ok(()) => info!("Deleted zip file: {}", archive.path.display()),
            Err(error) => warn!(
                "Failed to delete zip file {}: {error}",
                archive.path.display()
            ),
        }
        let _ = self.store.mark_complete(version);

        self.status
            .send(format!("Version {version} extracted successfully!"));
        Ok(())
    }

    async fn launch_version(&self, version: &str) -> RunOutcome {
        self.set_state(RunState::Launching);
        let display = &self.launcher.product().display;

        if let Err(error) = self.launcher.locate(version) {
            return self.fail(FailureStage::Launch, error.to_string());
        }

        self.status
            .send(format!("Launching {display} version {version}..."));
        match self.launcher.launch(version) {
            Ok(outcome) => {
                self.status
                    .send(format!("{display} version {version} launched successfully!"));
                self.close_after_delay().await;
                RunOutcome::Launched(outcome)
            }
            Err(error) => self.fail(FailureStage::Launch, error.to_string()),
        }
    }

    async fn close_after_delay(&self) {
        tokio::time::sleep(self.close_delay).await;
        info!("Closing launcher...");
        self.status.send("Closing launcher...");
        self.status.request_close();
    }

    fn fail(&self, stage: FailureStage, message: String) -> RunOutcome {
        error!("{message}");
        self.status.send(message);
        RunOutcome::Failed(stage)
    }
}

async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(dir).await? {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::create_dir_all(dir).await
}

/// Swap `staging` in as `target`, dropping whatever `target` held.
async fn replace_dir(staging: &Path, target: &Path) -> std::io::Result<()> {
    if tokio::fs::try_exists(target).await? {
        tokio::fs::remove_dir_all(target).await?;
    }
    tokio::fs::rename(staging, target).await
}

async fn discard_dir(dir: &Path) {
    if let Err(error) = tokio::fs::remove_dir_all(dir).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove {}: {error}", dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::{RunOutcome, RunState};

    #[test]
    fn only_in_flight_states_are_active() {
        assert!(!RunState::Idle.is_active());
        assert!(RunState::ResolvingRemote.is_active());
        assert!(RunState::DownloadingAndExtracting.is_active());
        assert!(RunState::Launching.is_active());
        assert!(!RunState::Done.is_active());
    }

    #[test]
    fn only_failed_outcomes_are_failures() {
        assert!(RunOutcome::Failed(super::FailureStage::Extraction).is_failure());
        assert!(!RunOutcome::NothingAvailable.is_failure());
        assert!(!RunOutcome::AlreadyRunning.is_failure());
    }
}
