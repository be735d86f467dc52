use crate::error::ManifestError;
use crate::platform::Platform;
use serde::Deserialize;
use serde::de::IgnoredAny;
use serde_json::Value;
use std::collections::BTreeMap;

const PREVIEW_CHARS: usize = 200;

/// The parts of a version manifest the updater acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionManifest {
    pub version: String,
    pub notes: Option<String>,
    /// Download location for the platform the manifest was parsed for.
    pub download_url: Option<String>,
}

/// Raw manifest document. Several historical shapes are accepted, so every
/// field is optional and loosely typed. A field of the wrong type is treated
/// as absent.
#[derive(Debug, Default, Deserialize)]
struct ManifestJson {
    version: Option<Value>,
    latest: Option<Value>,
    tag: Option<Value>,
    notes: Option<Value>,
    changelog: Option<Value>,
    platforms: Option<Value>,
    downloads: Option<Value>,
    #[serde(flatten)]
    links: UrlFields,
}

#[derive(Debug, Default, Deserialize)]
struct UrlFields {
    url: Option<Value>,
    download: Option<Value>,
    #[serde(rename = "downloadUrl")]
    download_url: Option<Value>,
}

impl UrlFields {
    fn first(&self) -> Option<String> {
        [&self.url, &self.download, &self.download_url]
            .into_iter()
            .find_map(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlatformEntry {
    Url(String),
    Fields(UrlFields),
    Other(IgnoredAny),
}

/// Ways a download URL can be expressed in a manifest, in the order they
/// are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadUrlStrategy {
    /// `platforms: { "darwin": "https://..." }` or `{ "darwin": { "url": ... } }`
    LegacyPlatforms,
    /// `downloads: { "win-portable": "https://...", "darwin": "https://..." }`
    Downloads,
    /// Top-level `url`, `download` or `downloadUrl`.
    TopLevel,
}

impl DownloadUrlStrategy {
    pub const ORDER: [DownloadUrlStrategy; 3] = [
        DownloadUrlStrategy::LegacyPlatforms,
        DownloadUrlStrategy::Downloads,
        DownloadUrlStrategy::TopLevel,
    ];

    fn resolve(&self, manifest: &ManifestJson, platform: Platform) -> Option<String> {
        let url = match self {
            DownloadUrlStrategy::LegacyPlatforms => {
                let table: BTreeMap<String, PlatformEntry> =
                    serde_json::from_value(manifest.platforms.clone()?).ok()?;
                platform.legacy_keys().iter().find_map(|key| match table.get(*key)? {
                    PlatformEntry::Url(url) => Some(url.clone()),
                    PlatformEntry::Fields(fields) => fields.first(),
                    PlatformEntry::Other(_) => None,
                })
            }
            DownloadUrlStrategy::Downloads => {
                let table: BTreeMap<String, Value> =
                    serde_json::from_value(manifest.downloads.clone()?).ok()?;
                platform
                    .download_keys()
                    .iter()
                    .find_map(|key| table.get(*key)?.as_str().map(str::to_string))
            }
            DownloadUrlStrategy::TopLevel => manifest.links.first(),
        };
        url.filter(|url| !url.trim().is_empty())
    }
}

impl VersionManifest {
    /// Parses a manifest body and resolves the download URL for `platform`.
    pub fn parse(body: &str, platform: Platform) -> Result<Self, ManifestError> {
        let json: ManifestJson =
            serde_json::from_str(body).map_err(|e| ManifestError::Parse {
                message: e.to_string(),
                preview: preview(body),
            })?;

        let version = [&json.version, &json.latest, &json.tag]
            .into_iter()
            .find_map(version_string)
            .ok_or(ManifestError::MissingVersion)?;

        let download_url = DownloadUrlStrategy::ORDER
            .iter()
            .find_map(|strategy| strategy.resolve(&json, platform));

        let notes = text(&json.notes).or_else(|| text(&json.changelog));

        Ok(Self {
            version,
            notes,
            download_url,
        })
    }
}

fn version_string(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A non-blank string value, untrimmed.
fn text(value: &Option<Value>) -> Option<String> {
    value
        .as_ref()?
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downloads_table_on_macos() {
        let manifest = VersionManifest::parse(
            r#"{"version":"9.9.9","downloads":{"darwin":"https://x/y.zip"}}"#,
            Platform::MacOs,
        )
        .unwrap();
        assert_eq!(manifest.version, "9.9.9");
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/y.zip"));
        assert_eq!(manifest.notes, None);
    }

    #[test]
    fn test_windows_prefers_portable() {
        let body = r#"{
            "version": "2.0.0",
            "downloads": {
                "win-install": "https://x/setup.exe",
                "win-portable": "https://x/portable.zip",
                "darwin": "https://x/mac.zip"
            }
        }"#;
        let manifest = VersionManifest::parse(body, Platform::Windows).unwrap();
        assert_eq!(
            manifest.download_url.as_deref(),
            Some("https://x/portable.zip")
        );

        let body = r#"{"version": "2.0.0", "downloads": {"win-install": "https://x/setup.exe"}}"#;
        let manifest = VersionManifest::parse(body, Platform::Windows).unwrap();
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/setup.exe"));
    }

    #[test]
    fn test_legacy_platforms_take_priority() {
        let body = r#"{
            "version": "2.0.0",
            "platforms": {"mac": {"downloadUrl": "https://legacy/mac.zip"}},
            "downloads": {"darwin": "https://new/mac.zip"},
            "url": "https://generic"
        }"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(
            manifest.download_url.as_deref(),
            Some("https://legacy/mac.zip")
        );

        let body = r#"{"version": "2.0.0", "platforms": {"win32": "https://legacy/win.exe"}}"#;
        let manifest = VersionManifest::parse(body, Platform::Windows).unwrap();
        assert_eq!(
            manifest.download_url.as_deref(),
            Some("https://legacy/win.exe")
        );
    }

    #[test]
    fn test_top_level_fallback() {
        let body = r#"{
            "version": "2.0.0",
            "platforms": {"linux": "https://linux"},
            "download": "https://generic/download",
            "changelog": "Fixes"
        }"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(
            manifest.download_url.as_deref(),
            Some("https://generic/download")
        );
        assert_eq!(manifest.notes.as_deref(), Some("Fixes"));

        let manifest = VersionManifest::parse(r#"{"version": "2.0.0"}"#, Platform::MacOs).unwrap();
        assert_eq!(manifest.download_url, None);
    }

    #[test]
    fn test_missing_version() {
        let err = VersionManifest::parse(r#"{"url": "https://x"}"#, Platform::MacOs).unwrap_err();
        assert!(matches!(err, ManifestError::MissingVersion));
        assert!(err.to_string().contains("missing the version field"));

        let err = VersionManifest::parse(r#"{"version": ""}"#, Platform::MacOs).unwrap_err();
        assert!(matches!(err, ManifestError::MissingVersion));
    }

    #[test]
    fn test_version_aliases() {
        let manifest = VersionManifest::parse(r#"{"latest": "1.4"}"#, Platform::Linux).unwrap();
        assert_eq!(manifest.version, "1.4");
        let manifest = VersionManifest::parse(r#"{"tag": "1.5"}"#, Platform::Linux).unwrap();
        assert_eq!(manifest.version, "1.5");
    }

    #[test]
    fn test_mistyped_optional_fields_are_ignored() {
        let body = r#"{"version":"9.9.9","notes":["a","b"],"downloads":{"darwin":"https://x/y.zip"}}"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/y.zip"));
        assert_eq!(manifest.notes, None);

        let body = r#"{
            "version": "9.9.9",
            "notes": 3,
            "changelog": "Fixes",
            "url": false,
            "download": {"mac": "https://x/nested.zip"},
            "downloads": {"darwin": "https://x/y.zip"}
        }"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/y.zip"));
        assert_eq!(manifest.notes.as_deref(), Some("Fixes"));

        let body = r#"{"version": "9.9.9", "url": false, "downloadUrl": "https://x/top.zip"}"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/top.zip"));

        let body = r#"{"version": "9.9.9", "platforms": {"darwin": {"url": 7}, "mac": "https://x/legacy.zip"}}"#;
        let manifest = VersionManifest::parse(body, Platform::MacOs).unwrap();
        assert_eq!(manifest.download_url.as_deref(), Some("https://x/legacy.zip"));
    }

    #[test]
    fn test_parse_failure_has_preview() {
        let body = format!("<html>{}</html>", "x".repeat(500));
        let err = VersionManifest::parse(&body, Platform::MacOs).unwrap_err();
        match err {
            ManifestError::Parse { preview, .. } => {
                assert_eq!(preview.chars().count(), 200);
                assert!(preview.starts_with("<html>"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
