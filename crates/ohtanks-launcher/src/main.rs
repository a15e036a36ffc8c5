mod logging;
mod settings;
mod single_instance;
mod terminal;

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use ohtanks_core::{
    ArchiveDownloader, DetachedSpawner, ExecutableLauncher, FailureStage, LocalVersionStore,
    Platform, ProductNames, RegistryError, RegistryResolver, Release, RunOutcome, StatusReporter,
    SupabaseRegistry, UpdateOrchestrator,
};
use ohtanks_platform::AppPaths;

use crate::settings::LauncherSettings;
use crate::single_instance::{AcquireError, SingleInstance};
use crate::terminal::StatusView;

/// Stands in for the registry when none is configured, so the launcher can
/// still start an installed build offline.
struct UnconfiguredRegistry;

#[async_trait]
impl RegistryResolver for UnconfiguredRegistry {
    async fn resolve_latest(&self, _platform: Platform) -> Result<Option<Release>, RegistryError> {
        Err(RegistryError::NotConfigured)
    }
}

fn main() -> ExitCode {
    let paths = match AppPaths::new() {
        Ok(paths) => paths,
        Err(error) => {
            eprintln!("OhTanks launcher cannot start: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = paths.ensure_dirs() {
        eprintln!("OhTanks launcher cannot create its directories: {error}");
        return ExitCode::FAILURE;
    }

    let settings_path = paths.settings_file();
    let settings = LauncherSettings::load(&settings_path);
    logging::init_logging(
        &paths.log_file(),
        settings.debug_logging,
        settings.max_log_size_bytes,
    );
    info!("OhTanks launcher {} starting", env!("CARGO_PKG_VERSION"));

    if !settings_path.exists()
        && let Err(error) = settings.save(&settings_path)
    {
        warn!("Failed to write default settings to {}: {error}", settings_path.display());
    }

    let _instance = match SingleInstance::acquire(&paths.instance_lock_file()) {
        Ok(instance) => Some(instance),
        Err(AcquireError::AlreadyRunning { pid }) => {
            match pid {
                Some(pid) => {
                    info!("Another launcher instance is already running (PID {pid}), exiting");
                    eprintln!("The OhTanks launcher is already running (PID {pid}).");
                }
                None => {
                    info!("Another launcher instance is already running, exiting");
                    eprintln!("The OhTanks launcher is already running.");
                }
            }
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            warn!("Single-instance check failed, continuing anyway: {error}");
            None
        }
    };

    let paths = match settings.versions_dir.clone() {
        Some(versions_dir) => paths.with_versions_dir(versions_dir),
        None => paths,
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            error!("Failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(&settings, &paths));
    info!("Launcher exiting after {outcome:?}");
    if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(settings: &LauncherSettings, paths: &AppPaths) -> RunOutcome {
    let registry: Arc<dyn RegistryResolver> =
        match SupabaseRegistry::new(&settings.registry_url, &settings.registry_api_key) {
            Ok(registry) => Arc::new(registry.with_table(settings.registry_table.clone())),
            Err(error) => {
                warn!("Version registry unavailable: {error}");
                Arc::new(UnconfiguredRegistry)
            }
        };

    let fetcher = match ArchiveDownloader::new() {
        Ok(fetcher) => Arc::new(fetcher),
        Err(error) => {
            error!("Failed to initialize downloader: {error}");
            eprintln!("Error downloading version: {error}");
            return RunOutcome::Failed(FailureStage::Download);
        }
    };

    info!("Versions directory: {}", paths.versions_dir.display());
    let launcher = ExecutableLauncher::new(
        LocalVersionStore::new(&paths.versions_dir),
        ProductNames::new(&settings.product_name, &settings.display_name),
        Arc::new(DetachedSpawner),
    );

    let (status, mut events) = StatusReporter::channel();
    let orchestrator = UpdateOrchestrator::new(launcher, registry, fetcher, status);
    let mut view = StatusView::new(std::io::stdout().lock());

    // The terminal is ready as soon as it exists, so the single ready
    // trigger fires immediately.
    let pipeline = orchestrator.run();
    tokio::pin!(pipeline);
    let outcome = loop {
        tokio::select! {
            outcome = &mut pipeline => break outcome,
            Some(event) = events.recv() => {
                if let Err(error) = view.render(&event) {
                    warn!("Failed to render status: {error}");
                }
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        if let Err(error) = view.render(&event) {
            warn!("Failed to render status: {error}");
        }
    }
    if view.close_requested() {
        info!("Launcher surface closed");
    }
    if let Err(error) = view.finish() {
        warn!("Failed to flush status output: {error}");
    }

    outcome
}
