use std::path::{Component, Path, PathBuf};

use log::{debug, warn};

use crate::version::sort_newest_first;

/// Written into a version directory once its build is fully unpacked.
pub const INSTALL_MARKER: &str = ".ohtanks-installed";

/// Installed builds, one subdirectory of the versions root per version.
#[derive(Debug, Clone)]
pub struct LocalVersionStore {
    root: PathBuf,
}

impl LocalVersionStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Version directory names, newest first.
    ///
    /// A missing or unreadable root yields an empty list. Hidden directories,
    /// including staging directories, are not versions.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) => {
                debug!(
                    "Versions directory {} not readable: {error}",
                    self.root.display()
                );
                return Vec::new();
            }
        };

        let mut versions: Vec<String> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect();

        sort_newest_first(&mut versions);
        versions
    }

    #[must_use]
    pub fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    #[must_use]
    pub fn is_complete(&self, version: &str) -> bool {
        is_valid_version_name(version) && self.version_dir(version).join(INSTALL_MARKER).is_file()
    }

    /// Hidden sibling directory an archive is unpacked into before it
    /// replaces the version directory.
    #[must_use]
    pub fn staging_dir(&self, version: &str) -> PathBuf {
        self.root.join(format!(".{version}.partial"))
    }

    /// Record that `version` is fully unpacked.
    ///
    /// # Errors
    /// Returns an error if the marker file cannot be written.
    pub fn mark_complete(&self, version: &str) -> std::io::Result<()> {
        let marker = self.version_dir(version).join(INSTALL_MARKER);
        std::fs::write(&marker, chrono::Utc::now().to_rfc3339()).inspect_err(|error| {
            warn!("Failed to write install marker {}: {error}", marker.display());
        })
    }
}

/// A version name is usable as a directory only if it is a single plain
/// path component.
#[must_use]
pub fn is_valid_version_name(version: &str) -> bool {
    let mut components = Path::new(version).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
