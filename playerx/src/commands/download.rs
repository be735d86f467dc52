use crate::cli::GlobalArgs;
use crate::ui;
use anyhow::{Context, Result};
use clap::Args;
use playerx_lib::downloader::Downloader;
use playerx_lib::progress::SpanProgress;
use std::path::PathBuf;

#[derive(Args)]
pub struct DownloadCommand {
    /// URL of the update package
    pub url: String,

    /// Directory to save the package in (defaults to the system temp directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

impl DownloadCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let mut config = global_args.config()?;
        if let Some(output) = self.output {
            config.download_dir = output;
        }

        let downloader = Downloader::new(&config)?;
        let path = downloader
            .download(&self.url, &SpanProgress::new())
            .await
            .context(format!("Failed to download {}", self.url))?;

        ui::success(&format!("Downloaded to: {}", path.display()));
        ui::tip(&format!("Run `playerx install {}` to install it.", path.display()));
        Ok(())
    }
}
