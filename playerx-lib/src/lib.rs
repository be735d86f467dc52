pub mod config;
pub mod downloader;
pub mod error;
pub mod host;
pub mod installer;
pub mod logging;
pub mod manifest;
pub mod manifest_fetch;
pub mod platform;
pub mod progress;
pub mod updater;
pub mod version;

#[cfg(test)]
pub mod test_helpers;
