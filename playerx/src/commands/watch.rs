use crate::cli::GlobalArgs;
use crate::commands::check::report_outcome;
use crate::terminal_window::TerminalWindow;
use anyhow::{Context, Result};
use clap::Args;
use playerx_lib::host::AppContext;
use playerx_lib::updater::Updater;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args)]
pub struct WatchCommand {
    /// Seconds to wait before checking (defaults to the startup delay)
    #[arg(long)]
    pub delay: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl WatchCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let mut config = global_args.config()?;
        if let Some(delay) = self.delay {
            config.startup_delay = Duration::from_secs(delay);
        }
        tracing::debug!("Checking for updates in {:?}", config.startup_delay);

        let context = AppContext::with_window(Arc::new(TerminalWindow::new()));
        let updater = Arc::new(Updater::new(config, context));

        let outcome = updater
            .spawn_startup_check()
            .await
            .context("Startup update check did not complete")?;
        report_outcome(&outcome, self.json)?;
        updater.wait_for_background().await;

        Ok(())
    }
}
