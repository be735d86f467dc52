//! The end-to-end update flow.
//!
//! `idle -> checking -> {no-source | error | up-to-date | update-available}`,
//! then either `opened` (browser download) or `downloading -> installing ->
//! relaunching`, which runs on a background task after the check returns.

use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::UpdateError;
use crate::host::{AppContext, Notice, UpdateChoice, UpdatePrompt};
use crate::installer::{self, InstallOutcome, Installer};
use crate::manifest::VersionManifest;
use crate::manifest_fetch::{ManifestFetcher, ManifestSource};
use crate::platform::Platform;
use crate::version;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

const CHECK_TITLE: &str = "Check for updates";

/// Result of one update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "status",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum UpdateOutcome {
    NoSource {
        current_version: String,
    },
    /// Another check or download is already running.
    Checking {
        current_version: String,
    },
    UpToDate {
        current_version: String,
        latest_version: String,
    },
    UpdateAvailable {
        current_version: String,
        latest_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        update_url: Option<String>,
    },
    Opened {
        current_version: String,
        latest_version: String,
        update_url: String,
    },
    /// The download and install continue in the background.
    Downloading {
        current_version: String,
        latest_version: String,
        update_url: String,
    },
    Error {
        error: String,
    },
}

/// Clears the in-flight flag when dropped.
struct FlightGuard(Arc<AtomicBool>);

impl FlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(flag.clone()))
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Updater {
    config: Config,
    context: AppContext,
    installer: Option<Arc<Installer>>,
    in_flight: Arc<AtomicBool>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Updater {
    pub fn new(config: Config, context: AppContext) -> Self {
        Self {
            config,
            context,
            installer: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            background: Mutex::new(None),
        }
    }

    /// Uses `installer` instead of one built from the config on demand.
    pub fn with_installer(mut self, installer: Installer) -> Self {
        self.installer = Some(Arc::new(installer));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn platform(&self) -> Platform {
        Platform::from_os(&self.config.os)
    }

    /// Runs one check. Never fails: every error becomes
    /// [`UpdateOutcome::Error`], shown as a dialog when `interactive`.
    pub async fn check_for_updates(&self, interactive: bool) -> UpdateOutcome {
        let current_version = self.config.current_version.clone();
        let Some(guard) = FlightGuard::acquire(&self.in_flight) else {
            tracing::info!("An update check is already in progress");
            if interactive {
                self.context.notify(&Notice::info(
                    CHECK_TITLE,
                    "An update check is already in progress",
                    "",
                ));
            }
            return UpdateOutcome::Checking { current_version };
        };

        match self.run_check(interactive, guard).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let error = e.to_string();
                tracing::error!("Update check failed: {}", error);
                if interactive {
                    self.context.notify(&Notice::error(
                        "Update check failed",
                        "Unable to fetch remote version information",
                        error.clone(),
                    ));
                }
                UpdateOutcome::Error { error }
            }
        }
    }

    async fn run_check(
        &self,
        interactive: bool,
        guard: FlightGuard,
    ) -> Result<UpdateOutcome, UpdateError> {
        let current_version = self.config.current_version.clone();

        let Some(location) = self.config.manifest_url.as_deref() else {
            tracing::info!("No update source configured");
            if interactive {
                self.context.notify(&Notice::info(
                    CHECK_TITLE,
                    format!("Current version: {current_version}"),
                    format!(
                        "No update source is configured. Set {} to the location of the \
                         version manifest, for example {}=https://example.com/playerx/latest.json",
                        crate::config::MANIFEST_URL_ENV,
                        crate::config::MANIFEST_URL_ENV,
                    ),
                ));
            }
            return Ok(UpdateOutcome::NoSource { current_version });
        };

        let fetcher = ManifestFetcher::new(&self.config)?;
        let body = fetcher.fetch(&ManifestSource::parse(location)).await?;
        let manifest = VersionManifest::parse(&body, self.platform())?;
        let latest_version = manifest.version.clone();
        tracing::debug!(
            "Running {}, latest is {}",
            current_version,
            latest_version
        );

        if version::compare(&latest_version, &current_version) <= 0 {
            if interactive {
                self.context.notify(&Notice::info(
                    "You're up to date",
                    format!("Current version: {current_version}"),
                    format!("Latest version: {latest_version}"),
                ));
            }
            return Ok(UpdateOutcome::UpToDate {
                current_version,
                latest_version,
            });
        }

        let prompt = self.update_prompt(&manifest);
        let choice = self.context.choose(&prompt);
        tracing::debug!("Update choice: {}", choice);

        match (choice, manifest.download_url) {
            (UpdateChoice::OpenInBrowser, Some(update_url)) => {
                self.context
                    .open_external(&update_url)
                    .map_err(|source| UpdateError::Open {
                        target: update_url.clone(),
                        source,
                    })?;
                Ok(UpdateOutcome::Opened {
                    current_version,
                    latest_version,
                    update_url,
                })
            }
            (UpdateChoice::InstallAutomatically, Some(update_url)) => {
                self.start_background_install(update_url.clone(), guard);
                Ok(UpdateOutcome::Downloading {
                    current_version,
                    latest_version,
                    update_url,
                })
            }
            (_, update_url) => Ok(UpdateOutcome::UpdateAvailable {
                current_version,
                latest_version,
                update_url,
            }),
        }
    }

    fn update_prompt(&self, manifest: &VersionManifest) -> UpdatePrompt {
        let choices = match (&manifest.download_url, self.platform()) {
            (None, _) => vec![UpdateChoice::Later],
            (Some(_), platform) if platform.supports_auto_install() => vec![
                UpdateChoice::InstallAutomatically,
                UpdateChoice::OpenInBrowser,
                UpdateChoice::Later,
            ],
            (Some(_), _) => vec![UpdateChoice::OpenInBrowser, UpdateChoice::Later],
        };
        UpdatePrompt {
            title: "A new version is available".to_string(),
            message: format!(
                "Current version: {}, latest version: {}",
                self.config.current_version, manifest.version
            ),
            detail: manifest
                .notes
                .clone()
                .unwrap_or_else(|| "Download the new version?".to_string()),
            choices,
            default: UpdateChoice::Later,
        }
    }

    fn start_background_install(&self, update_url: String, guard: FlightGuard) {
        let config = self.config.clone();
        let context = self.context.clone();
        let installer = self.installer.clone();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = download_and_install(&config, &context, installer, &update_url).await {
                tracing::error!("Automatic update failed: {}", e);
                context.notify(&Notice::error(
                    "Update failed",
                    "The update could not be installed",
                    e.to_string(),
                ));
            }
        });

        match self.background.lock() {
            Ok(mut slot) => *slot = Some(handle),
            Err(e) => tracing::warn!("Background install will not be awaited: {}", e),
        }
    }

    /// Waits for a download started by an automatic install, if any.
    pub async fn wait_for_background(&self) {
        let handle = match self.background.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::error!("Background install task failed: {}", e);
        }
    }

    /// Runs a non-interactive check once the startup delay has passed.
    pub fn spawn_startup_check(self: &Arc<Self>) -> JoinHandle<UpdateOutcome> {
        let updater = self.clone();
        let delay = self.config.startup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            updater.check_for_updates(false).await
        })
    }
}

async fn download_and_install(
    config: &Config,
    context: &AppContext,
    installer: Option<Arc<Installer>>,
    update_url: &str,
) -> Result<(), UpdateError> {
    let installer = match installer {
        Some(installer) => installer,
        None => Arc::new(Installer::new(config)?),
    };
    installer.ensure_supported()?;

    let downloader = Downloader::new(config)?;
    let progress = context.progress();
    let archive = downloader.download(update_url, progress.as_ref()).await?;

    match installer.install(&archive).await? {
        InstallOutcome::Relaunch { script, .. } => match installer::handoff(&script)? {},
        InstallOutcome::ManualInstall { bundle } => {
            context.notify(&Notice::info(
                "Update downloaded",
                "Please finish the installation manually",
                format!(
                    "{} is not running from an application bundle, so it cannot be replaced \
                     automatically. Move {} into your Applications folder.",
                    config.app_name,
                    bundle.display()
                ),
            ));
            if let Err(e) = context.reveal_in_file_browser(&bundle) {
                tracing::warn!("Failed to reveal {}: {}", bundle.display(), e);
            }
            Ok(())
        }
    }
}
