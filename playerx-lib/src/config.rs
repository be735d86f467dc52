use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MANIFEST_URL: &str =
    "https://tvp-76917.gzc.vod.tencent-cloud.com/rbyang/PlayerX/latest.json";

/// Overrides the manifest location (URL, `file://` URL or local path).
pub const MANIFEST_URL_ENV: &str = "UPDATE_JSON_URL";
/// Extra request headers, either a JSON object or a bare token.
pub const MANIFEST_HEADERS_ENV: &str = "UPDATE_JSON_HEADERS";
/// Bare token, used when `UPDATE_JSON_HEADERS` is not set.
pub const PRIVATE_TOKEN_ENV: &str = "PRIVATE_TOKEN";

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for PlayerX data
    pub data_dir: PathBuf,

    /// Directory holding the diagnostic copy of the last fetched manifest
    pub cache_dir: PathBuf,

    /// Directory downloaded update packages are written to
    pub download_dir: PathBuf,

    /// Scratch directory packages are unpacked into
    pub extraction_dir: PathBuf,

    /// Where the version manifest lives. `None` disables update checks.
    pub manifest_url: Option<String>,

    /// Extra headers sent with the manifest request.
    pub extra_headers: BTreeMap<String, String>,

    /// Application name, used in the User-Agent and default file names.
    pub app_name: String,

    /// Version of the running application.
    pub current_version: String,

    /// Platform-specific operating system string.
    pub os: String,

    /// Delay between the host becoming ready and the automatic check.
    pub startup_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new_for_path(&Self::default_data_dir())
    }
}

impl Config {
    pub fn new_for_path(data_dir: &Path) -> Self {
        let temp_dir = std::env::temp_dir();
        Self {
            data_dir: data_dir.to_path_buf(),
            cache_dir: data_dir.join("cache"),
            download_dir: temp_dir.join("playerx-update"),
            extraction_dir: temp_dir.join("playerx-update-extract"),
            manifest_url: Some(DEFAULT_MANIFEST_URL.to_string()),
            extra_headers: BTreeMap::new(),
            app_name: "PlayerX".to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            startup_delay: Duration::from_secs(3),
        }
    }

    /// Sets up a new Config for the given data directory and applies the
    /// environment overrides. See also [Self::default_data_dir].
    pub fn setup(data_dir: Option<&Path>) -> Result<Self> {
        let data_dir = data_dir
            .map(|d| d.to_path_buf())
            .unwrap_or_else(Self::default_data_dir);
        let config = Self::new_for_path(&data_dir).with_env_overrides();

        std::fs::create_dir_all(&config.cache_dir)
            .context(format!("Failed to create cache directory {:?}", config.cache_dir))?;

        Ok(config)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"))
            .join("playerx")
    }

    /// Applies `UPDATE_JSON_URL`, `UPDATE_JSON_HEADERS` and `PRIVATE_TOKEN`.
    pub fn with_env_overrides(self) -> Self {
        let url = std::env::var(MANIFEST_URL_ENV).ok();
        let headers = std::env::var(MANIFEST_HEADERS_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var(PRIVATE_TOKEN_ENV).ok());
        self.with_overrides(url.as_deref(), headers.as_deref())
    }

    fn with_overrides(mut self, manifest_url: Option<&str>, headers: Option<&str>) -> Self {
        if let Some(url) = manifest_url.map(str::trim).filter(|u| !u.is_empty()) {
            self.manifest_url = Some(url.to_string());
        }
        if let Some(raw) = headers {
            self.extra_headers.extend(parse_extra_headers(raw));
        }
        self
    }

    /// Overrides the manifest location. An empty string disables checks.
    pub fn with_manifest_url(mut self, manifest_url: &str) -> Self {
        let trimmed = manifest_url.trim();
        self.manifest_url = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.app_name, self.current_version)
    }
}

/// Parses the header override.
///
/// A value starting with `{` is read as a JSON object of header name to
/// value; anything else is a bare token sent as `PRIVATE-TOKEN`. Malformed
/// JSON is logged and ignored.
pub fn parse_extra_headers(raw: &str) -> BTreeMap<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return BTreeMap::new();
    }

    if !raw.starts_with('{') {
        return BTreeMap::from([(PRIVATE_TOKEN_HEADER.to_string(), raw.to_string())]);
    }

    match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .into_iter()
            .map(|(name, value)| match value {
                serde_json::Value::String(s) => (name, s),
                other => (name, other.to_string()),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Ignoring malformed {}: {}", MANIFEST_HEADERS_ENV, e);
            BTreeMap::new()
        }
    }
}
