use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to read local manifest {path:?}: {source}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest URL '{0}'")]
    InvalidUrl(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("HTTP error {0}")]
    HttpStatus(u16),

    #[error("Empty response (the server may require authentication)")]
    EmptyResponse,

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(err)
        }
    }
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to parse manifest JSON: {message}\nResponse preview: {preview}")]
    Parse { message: String, preview: String },

    #[error("Manifest is missing the version field")]
    MissingVersion,
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Invalid download URL '{0}'")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Download failed: HTTP {0}")]
    HttpStatus(u16),

    #[error("Download interrupted: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to write download to {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Automatic installation is not supported on {0}")]
    Unsupported(String),

    #[error("Failed to prepare extraction directory {path:?}: {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract update package: {0}")]
    Extract(String),

    #[error("No application bundle found in package")]
    NoBundle,

    #[error("Failed to locate the running application: {0}")]
    RunningApp(String),

    #[error("Failed to write the replacement script {path:?}: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to launch the replacement script: {0}")]
    Handoff(#[source] std::io::Error),
}

/// Every failure the update flow can surface. The orchestrator flattens these
/// into a single error outcome carrying the display message.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Install(#[from] InstallError),

    #[error("Failed to open {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: std::io::Error,
    },
}
