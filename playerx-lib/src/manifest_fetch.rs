use crate::config::Config;
use crate::error::FetchError;
use crate::logging::spinner_style;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, LOCATION, USER_AGENT};
use reqwest::{Client, StatusCode, Url, redirect};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub const MAX_REDIRECTS: usize = 5;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const CACHE_FILE_NAME: &str = "latest.json";

/// Where a manifest is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Remote(Url),
    Local(PathBuf),
}

impl ManifestSource {
    /// `http(s)` URLs are fetched over the network, `file://` URLs and
    /// anything else (including Windows drive paths) are read from disk.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if let Some(path) = location.strip_prefix("file://") {
            return ManifestSource::Local(PathBuf::from(path));
        }
        match Url::parse(location) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => ManifestSource::Remote(url),
            _ => ManifestSource::Local(PathBuf::from(location)),
        }
    }
}

pub struct ManifestFetcher {
    client: Client,
    headers: HeaderMap,
    cache_file: PathBuf,
    timeout: Duration,
}

impl ManifestFetcher {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            headers: request_headers(&config.user_agent(), &config.extra_headers),
            cache_file: config.cache_dir.join(CACHE_FILE_NAME),
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Overrides the time allowed for each hop of a remote fetch.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Returns the raw manifest text. The body is also copied to the cache
    /// file for diagnostics; failing to write that copy is only logged.
    #[instrument(skip_all)]
    pub async fn fetch(&self, source: &ManifestSource) -> Result<String, FetchError> {
        let current_span = tracing::Span::current();
        if let Ok(style) = spinner_style("{msg}") {
            current_span.pb_set_style(&style);
        }
        current_span.pb_set_message("Checking for updates...");

        let body = match source {
            ManifestSource::Local(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| FetchError::ReadLocal {
                        path: path.clone(),
                        source,
                    })?
            }
            ManifestSource::Remote(url) => self.get_following_redirects(url.clone()).await?,
        };

        self.save_cache(&body).await;

        if body.trim().is_empty() {
            return Err(FetchError::EmptyResponse);
        }
        Ok(body)
    }

    async fn get_following_redirects(&self, mut url: Url) -> Result<String, FetchError> {
        let mut redirects = 0;
        loop {
            tracing::debug!("GET {}", url);
            let response = self
                .client
                .get(url.clone())
                .headers(self.headers.clone())
                .timeout(self.timeout)
                .send()
                .await?;

            let status = response.status();
            if let Some(next) = redirect_target(&url, status, response.headers())
                .map_err(FetchError::InvalidUrl)?
            {
                if redirects >= MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects);
                }
                redirects += 1;
                tracing::debug!("Following redirect {} -> {}", url, next);
                url = next;
                continue;
            }

            if status.as_u16() >= 400 {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            return Ok(response.text().await?);
        }
    }

    async fn save_cache(&self, body: &str) {
        if let Some(parent) = self.cache_file.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            tracing::warn!("Failed to create manifest cache directory: {}", e);
            return;
        }
        if let Err(e) = tokio::fs::write(&self.cache_file, body).await {
            tracing::warn!("Failed to write manifest cache: {}", e);
        }
    }
}

/// Resolves the next URL for a 3xx response carrying a `Location` header.
/// Relative locations are joined against the URL that was requested. An
/// unusable location is returned as the error.
pub(crate) fn redirect_target(
    current: &Url,
    status: StatusCode,
    headers: &HeaderMap,
) -> Result<Option<Url>, String> {
    if !status.is_redirection() {
        return Ok(None);
    }
    let Some(location) = headers.get(LOCATION).and_then(|h| h.to_str().ok()) else {
        return Ok(None);
    };
    current
        .join(location)
        .map(Some)
        .map_err(|_| location.to_string())
}

fn request_headers(user_agent: &str, extra: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }
    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid request header '{}'", name),
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::http_server::{TestResponse, TestServer};

    fn test_config(dir: &Path) -> Config {
        Config::new_for_path(dir)
    }

    #[test]
    fn test_source_parsing() {
        assert!(matches!(
            ManifestSource::parse("https://example.com/latest.json"),
            ManifestSource::Remote(_)
        ));
        assert_eq!(
            ManifestSource::parse("file:///tmp/latest.json"),
            ManifestSource::Local(PathBuf::from("/tmp/latest.json"))
        );
        assert_eq!(
            ManifestSource::parse(r"C:\updates\latest.json"),
            ManifestSource::Local(PathBuf::from(r"C:\updates\latest.json"))
        );
        assert_eq!(
            ManifestSource::parse("./latest.json"),
            ManifestSource::Local(PathBuf::from("./latest.json"))
        );
    }

    #[test]
    fn test_redirect_target_resolves_relative_locations() {
        let current = Url::parse("https://example.com/a/b/latest.json").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("../moved.json"));
        let next = redirect_target(&current, StatusCode::FOUND, &headers)
            .unwrap()
            .unwrap();
        assert_eq!(next.as_str(), "https://example.com/a/moved.json");

        assert!(
            redirect_target(&current, StatusCode::OK, &headers)
                .unwrap()
                .is_none()
        );
        assert!(
            redirect_target(&current, StatusCode::FOUND, &HeaderMap::new())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_request_headers() {
        let extra = BTreeMap::from([
            ("PRIVATE-TOKEN".to_string(), "secret".to_string()),
            ("bad header".to_string(), "x".to_string()),
        ]);
        let headers = request_headers("PlayerX/1.0.0", &extra);
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[USER_AGENT], "PlayerX/1.0.0");
        assert_eq!(headers["private-token"], "secret");
        assert_eq!(headers.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_local_manifest_writes_cache() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let manifest_path = tmp_dir.path().join("manifest.json");
        std::fs::write(&manifest_path, r#"{"version":"1.2.3"}"#)?;

        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?;
        let body = fetcher
            .fetch(&ManifestSource::Local(manifest_path))
            .await?;
        assert_eq!(body, r#"{"version":"1.2.3"}"#);
        assert_eq!(std::fs::read_to_string(fetcher.cache_file())?, body);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_missing_local_manifest() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?;
        let err = fetcher
            .fetch(&ManifestSource::Local(tmp_dir.path().join("missing.json")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ReadLocal { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_follows_redirects_and_sends_headers() -> anyhow::Result<()> {
        let server = TestServer::start(vec![
            ("/start", TestResponse::redirect("/next")),
            ("/next", TestResponse::redirect("final.json")),
            ("/final.json", TestResponse::ok(r#"{"version":"2.0.0"}"#)),
        ])
        .await?;
        let tmp_dir = tempfile::tempdir()?;
        let mut config = test_config(tmp_dir.path());
        config
            .extra_headers
            .insert("PRIVATE-TOKEN".to_string(), "t0k".to_string());

        let fetcher = ManifestFetcher::new(&config)?;
        let body = fetcher
            .fetch(&ManifestSource::Remote(server.url("/start")))
            .await?;
        assert_eq!(body, r#"{"version":"2.0.0"}"#);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        let last = requests.last().unwrap().to_lowercase();
        assert!(last.starts_with("get /final.json "), "{last}");
        assert!(last.contains("accept: application/json"));
        assert!(last.contains("private-token: t0k"));
        assert!(last.contains(&format!("user-agent: {}", config.user_agent().to_lowercase())));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_too_many_redirects() -> anyhow::Result<()> {
        let server = TestServer::start(vec![
            ("/r0", TestResponse::redirect("/r1")),
            ("/r1", TestResponse::redirect("/r2")),
            ("/r2", TestResponse::redirect("/r3")),
            ("/r3", TestResponse::redirect("/r4")),
            ("/r4", TestResponse::redirect("/r5")),
            ("/r5", TestResponse::redirect("/r6")),
            ("/r6", TestResponse::ok(r#"{"version":"2.0.0"}"#)),
        ])
        .await?;
        let tmp_dir = tempfile::tempdir()?;
        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?;
        let err = fetcher
            .fetch(&ManifestSource::Remote(server.url("/r0")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects), "{err:?}");
        assert!(!fetcher.cache_file().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_allows_five_redirects() -> anyhow::Result<()> {
        let server = TestServer::start(vec![
            ("/r0", TestResponse::redirect("/r1")),
            ("/r1", TestResponse::redirect("/r2")),
            ("/r2", TestResponse::redirect("/r3")),
            ("/r3", TestResponse::redirect("/r4")),
            ("/r4", TestResponse::redirect("/r5")),
            ("/r5", TestResponse::ok(r#"{"version":"2.0.0"}"#)),
        ])
        .await?;
        let tmp_dir = tempfile::tempdir()?;
        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?;
        let body = fetcher
            .fetch(&ManifestSource::Remote(server.url("/r0")))
            .await?;
        assert_eq!(body, r#"{"version":"2.0.0"}"#);
        assert_eq!(server.requests().len(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_timeout() -> anyhow::Result<()> {
        let server = TestServer::start(vec![
            (
                "/slow",
                TestResponse::ok(r#"{"version":"2.0.0"}"#).with_delay(Duration::from_secs(5)),
            ),
            ("/start", TestResponse::redirect("/slow")),
        ])
        .await?;
        let tmp_dir = tempfile::tempdir()?;
        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?
            .with_timeout(Duration::from_millis(200));

        let err = fetcher
            .fetch(&ManifestSource::Remote(server.url("/slow")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "{err:?}");

        let err = fetcher
            .fetch(&ManifestSource::Remote(server.url("/start")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "{err:?}");
        assert!(!fetcher.cache_file().exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_http_error_and_empty_body() -> anyhow::Result<()> {
        let server = TestServer::start(vec![
            ("/forbidden", TestResponse::status(403, "")),
            ("/empty", TestResponse::ok("   ")),
        ])
        .await?;
        let tmp_dir = tempfile::tempdir()?;
        let fetcher = ManifestFetcher::new(&test_config(tmp_dir.path()))?;

        let err = fetcher
            .fetch(&ManifestSource::Remote(server.url("/forbidden")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(403)), "{err:?}");

        let err = fetcher
            .fetch(&ManifestSource::Remote(server.url("/empty")))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::EmptyResponse), "{err:?}");
        Ok(())
    }
}
