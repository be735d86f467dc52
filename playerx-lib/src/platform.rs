use std::fmt;

/// The operating systems the updater distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps a `std::env::consts::OS` style string to a platform.
    pub fn from_os(os: &str) -> Self {
        match os {
            "macos" | "darwin" | "mac" => Platform::MacOs,
            "windows" | "win32" | "win" => Platform::Windows,
            "linux" => Platform::Linux,
            _ => Platform::Other,
        }
    }

    /// Only macOS can replace the running bundle in place.
    pub fn supports_auto_install(&self) -> bool {
        matches!(self, Platform::MacOs)
    }

    /// Keys looked up in the legacy `platforms` manifest table, most specific first.
    pub fn legacy_keys(&self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["darwin", "mac"],
            Platform::Windows => &["win32", "win"],
            Platform::Linux => &["linux"],
            Platform::Other => &[],
        }
    }

    /// Keys looked up in the `downloads` manifest table.
    ///
    /// Windows prefers the portable build over the installer.
    pub fn download_keys(&self) -> &'static [&'static str] {
        match self {
            Platform::MacOs => &["darwin", "mac"],
            Platform::Windows => &["win-portable", "win-install", "win32", "win"],
            Platform::Linux => &["linux"],
            Platform::Other => &[],
        }
    }

    /// Extension used when a download URL does not name a file.
    pub fn default_package_extension(&self) -> &'static str {
        match self {
            Platform::Windows => "exe",
            _ => "zip",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::Other => std::env::consts::OS,
        };
        write!(f, "{name}")
    }
}
