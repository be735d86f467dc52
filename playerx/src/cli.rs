use anyhow::Result;
use clap::{Parser, Subcommand};
use playerx_lib::config::Config;
use std::path::PathBuf;

use crate::commands::{
    check::CheckCommand, compare::CompareCommand, download::DownloadCommand,
    install::InstallCommand, watch::WatchCommand,
};

#[derive(Parser)]
#[command(name = "playerx")]
#[command(about = "Keeps the PlayerX desktop shell up to date")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global_args: GlobalArgs,
}

#[derive(clap::Args, Clone)]
pub struct GlobalArgs {
    /// Version manifest to check against: an http(s) URL, a file:// URL or a
    /// local path. Pass an empty string to disable update checks.
    #[arg(long, global = true)]
    pub manifest: Option<String>,

    /// Use a different location for PlayerX's data, where the manifest cache is kept (useful for testing)
    #[arg(long, global = true)]
    pub datadir: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Loads the configuration and applies the command line overrides.
    pub fn config(&self) -> Result<Config> {
        let config = Config::setup(self.datadir.as_deref())?;
        Ok(match self.manifest.as_deref() {
            Some(manifest) => config.with_manifest_url(manifest),
            None => config,
        })
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check for a newer version and offer to install it
    Check(CheckCommand),

    /// Wait the startup delay, then check quietly, like the shell does on launch
    Watch(WatchCommand),

    /// Download an update package
    Download(DownloadCommand),

    /// Install a downloaded update package over the running application
    Install(InstallCommand),

    /// Compare two dotted version numbers
    Compare(CompareCommand),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Check(cmd) => cmd.run(self.global_args).await,
            Commands::Watch(cmd) => cmd.run(self.global_args).await,
            Commands::Download(cmd) => cmd.run(self.global_args).await,
            Commands::Install(cmd) => cmd.run(self.global_args).await,
            Commands::Compare(cmd) => cmd.run(),
        }
    }
}
