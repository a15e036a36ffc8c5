//! Update-and-launch pipeline for the OhTanks launcher.
//!
//! This crate holds the logic that is independent of how status is rendered:
//! - Version comparison and the local store of installed builds.
//! - Latest-release lookup against the remote version registry.
//! - Archive download through a chain of fallback strategies, with
//!   validation of the result.
//! - Archive extraction with progress reporting.
//! - Locating and starting an installed build as a detached process.
//! - The orchestrator tying these together per "ready" trigger.

pub mod confirm;
pub mod download;
pub mod extract;
pub mod launch;
mod local;
pub mod orchestrator;
pub mod registry;
mod status;
mod version;

/// Interstitial form parsing for the confirmation download flow.
pub use confirm::{ConfirmationError, resolve_confirmed_download_url};
/// Strategy-chain downloader and archive validation.
pub use download::{
    ArchiveDownloader, ArchiveFetcher, DownloadError, DownloadStrategy, DownloadedArchive,
    StrategyError, validate_archive,
};
/// Streaming archive extraction.
pub use extract::{ExtractError, extract_archive};
/// Executable discovery and detached process launch.
pub use launch::{
    DetachedSpawner, ExecutableLauncher, LaunchCommand, LaunchError, LaunchOutcome,
    ProcessSpawner, ProductNames,
};
/// Installed version directories and completeness markers.
pub use local::{INSTALL_MARKER, LocalVersionStore, is_valid_version_name};
/// End-to-end update-or-launch workflow.
pub use orchestrator::{FailureStage, RunOutcome, RunState, UpdateOrchestrator};
/// Remote version registry lookup.
pub use registry::{RegistryError, RegistryResolver, Release, SupabaseRegistry};
/// Status channel towards the UI.
pub use status::{STATUS_CHANNEL, StatusEvent, StatusReporter};
/// Dotted numeric version comparison.
pub use version::{compare_versions, sort_newest_first};

pub use ohtanks_platform::Platform;
