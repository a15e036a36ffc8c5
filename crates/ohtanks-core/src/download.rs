use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Url;
use reqwest::header::{self, HeaderMap, HeaderValue};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::confirm::{ConfirmationError, resolve_confirmed_download_url};
use crate::registry::Release;
use crate::status::StatusReporter;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
pub const STANDARD_MAX_REDIRECTS: usize = 5;
pub const FALLBACK_MAX_REDIRECTS: usize = 10;

/// Leading bytes of a zip local file header.
pub const ARCHIVE_SIGNATURE: [u8; 2] = [0x50, 0x4B];

const BROWSER_USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 ",
    "(KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
);
const DRIVE_HOST: &str = "drive.google.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStrategy {
    /// Plain streaming GET of the release URL.
    Direct,
    /// Scrape the interstitial form and follow it to the real file.
    Confirmation,
    /// Plain GET again, with browser-like headers and more redirects.
    AlternativeEndpoint,
}

impl DownloadStrategy {
    pub const CHAIN: [DownloadStrategy; 3] = [
        DownloadStrategy::Direct,
        DownloadStrategy::Confirmation,
        DownloadStrategy::AlternativeEndpoint,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            DownloadStrategy::Direct => "direct",
            DownloadStrategy::Confirmation => "confirmation",
            DownloadStrategy::AlternativeEndpoint => "alternative endpoint",
        }
    }
}

impl std::fmt::Display for DownloadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A downloaded file that passed archive validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub bytes: u64,
    pub strategy: DownloadStrategy,
}

/// Why a single strategy did not produce a valid archive.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("server responded with HTTP {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("received an HTML page instead of the archive")]
    Interstitial,
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("downloaded file is empty")]
    EmptyFile,
    #[error("downloaded file is not a valid zip archive (signature {0})")]
    BadSignature(String),
}

impl StrategyError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::Io {
            context,
            source: std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid download URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },
    #[error("failed to build download client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("all download methods failed ({})", summarize_attempts(.attempts))]
    Exhausted {
        attempts: Vec<(DownloadStrategy, StrategyError)>,
    },
}

fn summarize_attempts(attempts: &[(DownloadStrategy, StrategyError)]) -> String {
    attempts
        .iter()
        .map(|(strategy, error)| format!("{strategy}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Something that can place a release archive at a local path.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    async fn fetch(
        &self,
        release: &Release,
        dest: &Path,
        status: &StatusReporter,
    ) -> Result<DownloadedArchive, DownloadError>;
}

/// Downloads release archives through the strategy chain.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    client: reqwest::Client,
    fallback_client: reqwest::Client,
}

impl ArchiveDownloader {
    /// # Errors
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new() -> Result<Self, DownloadError> {
        Ok(Self {
            client: build_client(STANDARD_MAX_REDIRECTS)?,
            fallback_client: build_client(FALLBACK_MAX_REDIRECTS)?,
        })
    }

    /// Download `url` to `dest`, trying each strategy in turn until one
    /// yields a file that validates as a zip archive.
    ///
    /// A file that fails validation is removed before the next strategy runs,
    /// so on error nothing is left at `dest`.
    ///
    /// # Errors
    /// Returns an error when the URL is unusable or every strategy fails.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        status: &StatusReporter,
    ) -> Result<DownloadedArchive, DownloadError> {
        let url = normalize_download_url(url)?;
        let mut attempts = Vec::new();

        for (index, strategy) in DownloadStrategy::CHAIN.into_iter().enumerate() {
            info!("Downloading {url} using {strategy} method");
            match self.run_strategy(strategy, &url, dest, status).await {
                Ok(bytes) => {
                    info!("Download complete via {strategy} method: {bytes} bytes");
                    return Ok(DownloadedArchive {
                        path: dest.to_path_buf(),
                        bytes,
                        strategy,
                    });
                }
                Err(error) => {
                    warn!("Download via {strategy} method failed: {error}");
                    discard_partial(dest).await;
                    if let Some(next) = DownloadStrategy::CHAIN.get(index + 1) {
                        status.send(retry_message(&error, *next));
                    }
                    attempts.push((strategy, error));
                }
            }
        }

        Err(DownloadError::Exhausted { attempts })
    }

    async fn run_strategy(
        &self,
        strategy: DownloadStrategy,
        url: &Url,
        dest: &Path,
        status: &StatusReporter,
    ) -> Result<u64, StrategyError> {
        match strategy {
            DownloadStrategy::Direct => {
                let response = get_checked(self.client.get(url.clone())).await?;
                if is_markup(response.headers()) {
                    info!("Download returned an HTML page, likely a virus scan interstitial");
                    return Err(StrategyError::Interstitial);
                }
                stream_to_file(response, dest, status).await?;
            }
            DownloadStrategy::Confirmation => {
                let page = get_checked(self.client.get(url.clone())).await?;
                if !is_markup(page.headers()) {
                    info!("Confirmation request returned a non-HTML body, skipping it");
                    return Err(ConfirmationError::MissingForm.into());
                }
                let page_url = page.url().clone();
                let html = page.text().await.map_err(|error| {
                    StrategyError::http("failed to read confirmation page", error)
                })?;
                let confirmed = resolve_confirmed_download_url(&html, &page_url)?;
                debug!("Resolved confirmed download URL: {confirmed}");
                let response = get_checked(self.client.get(confirmed)).await?;
                stream_to_file(response, dest, status).await?;
            }
            DownloadStrategy::AlternativeEndpoint => {
                let request = self
                    .fallback_client
                    .get(url.clone())
                    .headers(browser_headers());
                let response = get_checked(request).await?;
                stream_to_file(response, dest, status).await?;
            }
        }

        validate_archive(dest)
    }
}

#[async_trait]
impl ArchiveFetcher for ArchiveDownloader {
    async fn fetch(
        &self,
        release: &Release,
        dest: &Path,
        status: &StatusReporter,
    ) -> Result<DownloadedArchive, DownloadError> {
        self.download(&release.download_url, dest, status).await
    }
}

fn build_client(max_redirects: usize) -> Result<reqwest::Client, DownloadError> {
    reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(max_redirects))
        .user_agent(BROWSER_USER_AGENT)
        .build()
        .map_err(DownloadError::ClientBuild)
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.5"),
    );
    // reqwest sets Accept-Encoding itself and only decodes what it negotiated.
    headers.insert(header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

fn retry_message(error: &StrategyError, next: DownloadStrategy) -> &'static str {
    match (error, next) {
        (StrategyError::Interstitial, DownloadStrategy::Confirmation) => {
            "Download requires confirmation, retrying..."
        }
        (_, DownloadStrategy::Confirmation) => "Retrying download via confirmation page...",
        (_, DownloadStrategy::AlternativeEndpoint | DownloadStrategy::Direct) => {
            "Trying alternative download method..."
        }
    }
}

async fn get_checked(request: reqwest::RequestBuilder) -> Result<reqwest::Response, StrategyError> {
    let response = request
        .send()
        .await
        .map_err(|error| StrategyError::http("download request failed", error))?;

    if !response.status().is_success() {
        return Err(StrategyError::HttpStatus(response.status()));
    }
    Ok(response)
}

fn is_markup(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_ascii_lowercase)
        .is_some_and(|content_type| {
            content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
        })
}

async fn stream_to_file(
    response: reqwest::Response,
    dest: &Path,
    status: &StatusReporter,
) -> Result<u64, StrategyError> {
    use futures_util::StreamExt;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut last_percent = None;

    let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
        StrategyError::io_with_path("failed to create download file", dest, &error)
    })?;

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| StrategyError::http("download stream error", error))?;
        file.write_all(&chunk).await.map_err(|error| {
            StrategyError::io_with_path("failed to write download data", dest, &error)
        })?;
        downloaded += chunk.len() as u64;

        if total > 0 {
            let percent = (downloaded * 100 / total).min(100);
            if last_percent != Some(percent) {
                last_percent = Some(percent);
                status.send(format!(
                    "Downloading: {percent}% ({} / {})",
                    format_megabytes(downloaded),
                    format_megabytes(total)
                ));
            }
        }
    }

    file.flush().await.map_err(|error| {
        StrategyError::io_with_path("failed to flush download file", dest, &error)
    })?;

    debug!("Wrote {downloaded} bytes to {}", dest.display());
    Ok(downloaded)
}

fn format_megabytes(bytes: u64) -> String {
    let tenths = bytes * 10 / (1024 * 1024);
    format!("{}.{} MB", tenths / 10, tenths % 10)
}

async fn discard_partial(dest: &Path) {
    match tokio::fs::remove_file(dest).await {
        Ok(()) => debug!("Removed rejected download {}", dest.display()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => warn!("Failed to remove rejected download {}: {error}", dest.display()),
    }
}

/// Check that `path` is non-empty and starts with the zip signature.
///
/// Returns the file size on success.
///
/// # Errors
/// Returns an error if the file cannot be read, is empty, or does not start
/// with [`ARCHIVE_SIGNATURE`].
pub fn validate_archive(path: &Path) -> Result<u64, StrategyError> {
    let size = std::fs::metadata(path)
        .map_err(|error| StrategyError::io_with_path("failed to inspect download", path, &error))?
        .len();
    if size == 0 {
        return Err(StrategyError::EmptyFile);
    }

    let mut file = std::fs::File::open(path)
        .map_err(|error| StrategyError::io_with_path("failed to open download", path, &error))?;
    let mut header = Vec::with_capacity(4);
    file.by_ref()
        .take(4)
        .read_to_end(&mut header)
        .map_err(|error| StrategyError::io_with_path("failed to read download", path, &error))?;

    if header.len() < ARCHIVE_SIGNATURE.len() || header[..2] != ARCHIVE_SIGNATURE {
        let signature: String = header.iter().map(|byte| format!("{byte:02x}")).collect();
        warn!("Rejected download with signature {signature}");
        return Err(StrategyError::BadSignature(signature));
    }

    Ok(size)
}

/// Parse a release URL, rewriting Drive share links to their direct
/// download form.
///
/// # Errors
/// Returns an error for unparseable or non-HTTP(S) URLs.
pub fn normalize_download_url(raw: &str) -> Result<Url, DownloadError> {
    let invalid = |details: &str| DownloadError::InvalidUrl {
        url: raw.to_string(),
        details: details.to_string(),
    };

    let url = Url::parse(raw.trim()).map_err(|error| invalid(&error.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs are supported"));
    }

    if url.host_str() == Some(DRIVE_HOST)
        && let Some(mut segments) = url.path_segments()
        && segments.next() == Some("file")
        && segments.next() == Some("d")
        && let Some(file_id) = segments.next().filter(|id| !id.is_empty())
    {
        let mut direct = Url::parse("https://drive.google.com/uc")
            .map_err(|error| invalid(&error.to_string()))?;
        direct
            .query_pairs_mut()
            .append_pair("export", "download")
            .append_pair("id", file_id);
        return Ok(direct);
    }

    Ok(url)
}
