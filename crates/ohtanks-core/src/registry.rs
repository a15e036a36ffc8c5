use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, info, warn};
use ohtanks_platform::Platform;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(300);
const REGISTRY_MAX_REDIRECTS: usize = 5;
const DEFAULT_TABLE: &str = "versions";

/// One release record from the version registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    pub version: String,
    pub platform: Platform,
    pub download_url: String,
    /// Publication time; `None` when the column is missing or unreadable.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Postgres renders `timestamp` without an offset and `timestamptz` with a
/// short `+00` offset; both count as UTC here.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!("Ignoring unreadable release timestamp '{raw}'");
        }
        parsed
    }))
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("version registry is not configured")]
    NotConfigured,
    #[error("invalid registry URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },
    #[error("failed to build registry client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to query version registry: {0}")]
    Request(#[source] reqwest::Error),
    #[error("version registry query failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse version registry response: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Source of the latest published release for a platform.
///
/// `Ok(None)` means the registry answered but has nothing for the platform;
/// `Err` means the registry could not be queried at all.
#[async_trait]
pub trait RegistryResolver: Send + Sync {
    async fn resolve_latest(&self, platform: Platform) -> Result<Option<Release>, RegistryError>;
}

/// PostgREST-backed registry (a Supabase `versions` table).
#[derive(Debug, Clone)]
pub struct SupabaseRegistry {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseRegistry {
    /// # Errors
    /// Returns an error when no registry URL is configured or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RegistryError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(RegistryError::NotConfigured);
        }

        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(REGISTRY_MAX_REDIRECTS))
            .user_agent(format!("ohtanks-launcher/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RegistryError::ClientBuild)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            table: DEFAULT_TABLE.to_string(),
        })
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn query_url(&self, platform: Platform) -> Result<Url, RegistryError> {
        let raw = format!("{}/rest/v1/{}", self.base_url, self.table);
        let mut url = Url::parse(&raw).map_err(|error| RegistryError::InvalidUrl {
            url: raw.clone(),
            details: error.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("platform", &format!("eq.{}", platform.as_str()))
            .append_pair("order", "created_at.desc")
            .append_pair("limit", "1");
        Ok(url)
    }
}

#[async_trait]
impl RegistryResolver for SupabaseRegistry {
    async fn resolve_latest(&self, platform: Platform) -> Result<Option<Release>, RegistryError> {
        let url = self.query_url(platform)?;
        debug!("Querying version registry: {url}");

        let response = self
            .client
            .get(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(RegistryError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(RegistryError::HttpStatus {
                status,
                body_snippet,
            });
        }

        let releases: Vec<Release> = response.json().await.map_err(RegistryError::Parse)?;
        let latest = newest_release(releases);

        match &latest {
            Some(release) => info!("Latest version for {platform}: {}", release.version),
            None => info!("No versions found for platform {platform}"),
        }

        Ok(latest)
    }
}

fn newest_release(releases: Vec<Release>) -> Option<Release> {
    releases.into_iter().max_by_key(|release| release.created_at)
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
