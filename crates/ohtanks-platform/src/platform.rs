use serde::{Deserialize, Serialize};

/// Platform tag as stored in the version registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Platform {
    Windows,
    #[serde(rename = "MACOS")]
    MacOs,
    Linux,
}

impl Platform {
    /// The platform this binary was compiled for. Targets without a
    /// dedicated build are treated as Windows.
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Windows
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "WINDOWS",
            Platform::MacOs => "MACOS",
            Platform::Linux => "LINUX",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::MacOs => "macOS",
            Platform::Linux => "Linux",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn registry_tags_are_upper_case() {
        assert_eq!(Platform::Windows.as_str(), "WINDOWS");
        assert_eq!(Platform::MacOs.as_str(), "MACOS");
        assert_eq!(Platform::Linux.as_str(), "LINUX");
    }

    #[test]
    fn serde_uses_registry_tags() {
        let encoded = serde_json::to_string(&Platform::MacOs).expect("platform should serialize");
        assert_eq!(encoded, "\"MACOS\"");

        let decoded: Platform =
            serde_json::from_str("\"LINUX\"").expect("platform should deserialize");
        assert_eq!(decoded, Platform::Linux);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn current_matches_linux_target() {
        assert_eq!(Platform::current(), Platform::Linux);
    }
}
