use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    /// Base URL of the version registry, e.g. `https://<project>.supabase.co`.
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    #[serde(default = "default_registry_api_key")]
    pub registry_api_key: String,

    #[serde(default = "default_registry_table")]
    pub registry_table: String,

    #[serde(default = "default_product_name")]
    pub product_name: String,

    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Overrides `<working-directory>/versions`.
    #[serde(default)]
    pub versions_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_true() -> bool {
    true
}

fn default_registry_url() -> String {
    option_env!("OHTANKS_REGISTRY_URL")
        .unwrap_or_default()
        .to_string()
}

fn default_registry_api_key() -> String {
    option_env!("OHTANKS_REGISTRY_KEY")
        .unwrap_or_default()
        .to_string()
}

fn default_registry_table() -> String {
    "versions".to_string()
}

fn default_product_name() -> String {
    "ohtanks".to_string()
}

fn default_display_name() -> String {
    "OhTanks".to_string()
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            registry_api_key: default_registry_api_key(),
            registry_table: default_registry_table(),
            product_name: default_product_name(),
            display_name: default_display_name(),
            versions_dir: None,
            debug_logging: true,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl LauncherSettings {
    /// Read settings from `path`, falling back to defaults when the file is
    /// missing, unreadable, or malformed.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::LauncherSettings;

    #[test]
    fn defaults_match_product_and_logging_expectations() {
        let settings = LauncherSettings::default();

        assert_eq!(settings.registry_table, "versions");
        assert_eq!(settings.product_name, "ohtanks");
        assert_eq!(settings.display_name, "OhTanks");
        assert_eq!(settings.versions_dir, None);
        assert!(settings.debug_logging);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let settings: LauncherSettings = serde_json::from_str(
            r#"{ "registry_url": "https://project.supabase.co", "debug_logging": false }"#,
        )
        .expect("partial settings should deserialize");

        assert_eq!(settings.registry_url, "https://project.supabase.co");
        assert!(!settings.debug_logging);
        assert_eq!(settings.product_name, "ohtanks");
        assert_eq!(settings.registry_table, "versions");
    }

    #[test]
    fn missing_and_corrupt_files_load_defaults() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");

        assert_eq!(LauncherSettings::load(&path), LauncherSettings::default());

        std::fs::write(&path, "{ not json").expect("settings file should be written");
        assert_eq!(LauncherSettings::load(&path), LauncherSettings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("config").join("settings.json");
        let settings = LauncherSettings {
            registry_api_key: "anon".to_string(),
            versions_dir: Some(PathBuf::from("/opt/ohtanks/versions")),
            max_log_size_bytes: 1024,
            ..LauncherSettings::default()
        };

        settings.save(&path).expect("settings should be saved");

        assert_eq!(LauncherSettings::load(&path), settings);
    }
}
