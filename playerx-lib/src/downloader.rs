use crate::config::Config;
use crate::error::DownloadError;
use crate::manifest_fetch::{MAX_REDIRECTS, redirect_target};
use crate::platform::Platform;
use crate::progress::{DownloadState, ProgressReporter};
use futures_util::StreamExt;
use reqwest::{Client, Response, Url, redirect};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Pause after reporting 100% so the progress surface can show it.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Streams update packages to the download directory.
pub struct Downloader {
    client: Client,
    download_dir: PathBuf,
    platform: Platform,
    app_name: String,
    settle_delay: Duration,
}

impl Downloader {
    pub fn new(config: &Config) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(config.user_agent())
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            download_dir: config.download_dir.clone(),
            platform: Platform::from_os(&config.os),
            app_name: config.app_name.clone(),
            settle_delay: SETTLE_DELAY,
        })
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Downloads `url` and returns the path of the completed file.
    ///
    /// A redirect restarts the download against the new location. On any
    /// failure the partially written file is removed.
    pub async fn download(
        &self,
        url: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<PathBuf, DownloadError> {
        let mut url = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        let mut redirects = 0;

        loop {
            let file_name = package_file_name(&url, self.platform, &self.app_name);
            progress.open(&format!("Downloading {file_name}..."));

            let response = match self.client.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    progress.close();
                    return Err(e.into());
                }
            };

            let status = response.status();
            let next = redirect_target(&url, status, response.headers())
                .map_err(DownloadError::InvalidUrl);
            match next {
                Ok(Some(next)) => {
                    progress.close();
                    if redirects >= MAX_REDIRECTS {
                        return Err(DownloadError::TooManyRedirects);
                    }
                    redirects += 1;
                    tracing::debug!("Download redirected to {}", next);
                    url = next;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    progress.close();
                    return Err(e);
                }
            }

            if status.as_u16() >= 400 {
                progress.close();
                return Err(DownloadError::HttpStatus(status.as_u16()));
            }

            let destination = self.download_dir.join(&file_name);
            let state = match self.stream_to_file(response, &destination, progress).await {
                Ok(state) => state,
                Err(e) => {
                    progress.close();
                    return Err(e);
                }
            };

            progress.update(&state.completed());
            tokio::time::sleep(self.settle_delay).await;
            progress.close();
            tracing::info!("Downloaded update to {}", destination.display());
            return Ok(destination);
        }
    }

    async fn stream_to_file(
        &self,
        response: Response,
        destination: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<DownloadState, DownloadError> {
        let partial = partial_path(destination);
        let write_error = |source| DownloadError::Write {
            path: partial.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(write_error)?;
        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(write_error)?;

        let mut state = DownloadState::new(response.content_length(), Instant::now());
        let result = write_chunks(response, &mut file, &mut state, progress, &partial).await;
        drop(file);

        if let Err(e) = result {
            if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
                tracing::warn!("Failed to remove partial download: {}", remove_err);
            }
            return Err(e);
        }

        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|source| DownloadError::Write {
                path: destination.to_path_buf(),
                source,
            })?;
        Ok(state)
    }
}

async fn write_chunks(
    response: Response,
    file: &mut tokio::fs::File,
    state: &mut DownloadState,
    progress: &dyn ProgressReporter,
    partial: &Path,
) -> Result<(), DownloadError> {
    let write_error = |source| DownloadError::Write {
        path: partial.to_path_buf(),
        source,
    };

    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(write_error)?;
        if let Some(snapshot) = state.record(chunk.len() as u64, Instant::now()) {
            progress.update(&snapshot);
        }
    }
    file.flush().await.map_err(write_error)?;
    Ok(())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// File name for a package URL: the last path segment when it has an
/// extension, otherwise `<app>-update.<exe|zip>`.
pub fn package_file_name(url: &Url, platform: Platform, app_name: &str) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| !ext.is_empty())
        })
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "{}-update.{}",
                app_name,
                platform.default_package_extension()
            )
        })
}
