//! The surface the updater talks to: dialogs, choices, links and progress.
//!
//! The updater never reaches for a global window. It is handed an
//! [`AppContext`] that owns zero or one [`HostWindow`]; without a window
//! every prompt resolves to its least destructive answer.

use crate::progress::{NoopProgress, ProgressReporter};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A blocking message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    pub detail: String,
}

impl Notice {
    pub fn info(title: &str, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.to_string(),
            message: message.into(),
            detail: detail.into(),
        }
    }

    pub fn error(title: &str, message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.to_string(),
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// What the user can do about an available update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateChoice {
    /// Download and replace the running application in place.
    InstallAutomatically,
    /// Open the download link in the default browser.
    OpenInBrowser,
    Later,
}

impl fmt::Display for UpdateChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateChoice::InstallAutomatically => "Download and install",
            UpdateChoice::OpenInBrowser => "Download in browser",
            UpdateChoice::Later => "Later",
        };
        write!(f, "{label}")
    }
}

/// A question with a fixed set of answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePrompt {
    pub title: String,
    pub message: String,
    pub detail: String,
    pub choices: Vec<UpdateChoice>,
    pub default: UpdateChoice,
}

pub trait HostWindow: Send + Sync {
    fn notify(&self, notice: &Notice);

    /// Returns `None` when the prompt was dismissed. Called from async code
    /// and may block until the user answers; implementations that wait on
    /// input should do so inside `tokio::task::block_in_place`.
    fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateChoice>;

    fn open_external(&self, url: &str) -> std::io::Result<()>;

    fn reveal_in_file_browser(&self, path: &Path) -> std::io::Result<()>;

    /// A fresh progress surface for one download.
    fn progress(&self) -> Arc<dyn ProgressReporter>;
}

#[derive(Clone, Default)]
pub struct AppContext {
    window: Option<Arc<dyn HostWindow>>,
}

impl AppContext {
    pub fn headless() -> Self {
        Self { window: None }
    }

    pub fn with_window(window: Arc<dyn HostWindow>) -> Self {
        Self {
            window: Some(window),
        }
    }

    pub fn window(&self) -> Option<&Arc<dyn HostWindow>> {
        self.window.as_ref()
    }

    pub fn notify(&self, notice: &Notice) {
        match &self.window {
            Some(window) => window.notify(notice),
            None => tracing::info!("{}: {} {}", notice.title, notice.message, notice.detail),
        }
    }

    /// Dismissed prompts, answers outside the offered set and a missing
    /// window all resolve to the prompt's default.
    pub fn choose(&self, prompt: &UpdatePrompt) -> UpdateChoice {
        self.window
            .as_ref()
            .and_then(|window| window.choose(prompt))
            .filter(|choice| prompt.choices.contains(choice))
            .unwrap_or(prompt.default)
    }

    pub fn open_external(&self, url: &str) -> std::io::Result<()> {
        match &self.window {
            Some(window) => window.open_external(url),
            None => Err(std::io::Error::other("no window to open links from")),
        }
    }

    pub fn reveal_in_file_browser(&self, path: &Path) -> std::io::Result<()> {
        match &self.window {
            Some(window) => window.reveal_in_file_browser(path),
            None => Err(std::io::Error::other("no window to reveal files from")),
        }
    }

    pub fn progress(&self) -> Arc<dyn ProgressReporter> {
        match &self.window {
            Some(window) => window.progress(),
            None => Arc::new(NoopProgress),
        }
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContext")
            .field("has_window", &self.window.is_some())
            .finish()
    }
}
