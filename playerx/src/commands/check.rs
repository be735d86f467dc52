use crate::cli::GlobalArgs;
use crate::terminal_window::TerminalWindow;
use crate::ui;
use anyhow::Result;
use clap::Args;
use playerx_lib::host::AppContext;
use playerx_lib::updater::{UpdateOutcome, Updater};
use std::sync::Arc;

#[derive(Args)]
pub struct CheckCommand {
    /// Don't show notices; only report the result
    #[arg(long, short)]
    pub quiet: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let config = global_args.config()?;
        let context = AppContext::with_window(Arc::new(TerminalWindow::new()));
        let updater = Updater::new(config, context);

        let outcome = updater.check_for_updates(!self.quiet).await;
        report_outcome(&outcome, self.json)?;
        updater.wait_for_background().await;

        Ok(())
    }
}

/// Prints an outcome either as JSON on stdout or as a one-line summary.
pub fn report_outcome(outcome: &UpdateOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    match outcome {
        UpdateOutcome::NoSource { current_version } => {
            ui::warning(&format!(
                "PlayerX {current_version}: no update source configured"
            ));
            ui::tip("Set UPDATE_JSON_URL or pass --manifest to enable update checks.");
        }
        UpdateOutcome::Checking { .. } => ui::info("An update check is already in progress"),
        UpdateOutcome::UpToDate {
            current_version, ..
        } => ui::success(&format!("PlayerX {current_version} is up to date")),
        UpdateOutcome::UpdateAvailable {
            current_version,
            latest_version,
            update_url,
        } => {
            ui::warning(&format!(
                "PlayerX {latest_version} is available (running {current_version})"
            ));
            if let Some(url) = update_url {
                ui::tip(&format!("Download it from {url}"));
            }
        }
        UpdateOutcome::Opened { update_url, .. } => {
            ui::success(&format!("Opened {update_url} in the browser"))
        }
        UpdateOutcome::Downloading { latest_version, .. } => {
            ui::info(&format!("Downloading PlayerX {latest_version}..."))
        }
        UpdateOutcome::Error { error } => ui::error(error),
    }
    Ok(())
}
