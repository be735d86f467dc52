use crate::cli::GlobalArgs;
use crate::terminal_window::TerminalWindow;
use crate::ui;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use playerx_lib::host::HostWindow;
use playerx_lib::installer::{self, ArchiveTool, InstallOutcome, Installer};
use std::path::PathBuf;

#[derive(Clone, Copy, ValueEnum)]
pub enum ArchiveToolArg {
    Ditto,
    Unzip,
    Builtin,
}

impl From<ArchiveToolArg> for ArchiveTool {
    fn from(tool: ArchiveToolArg) -> Self {
        match tool {
            ArchiveToolArg::Ditto => ArchiveTool::Ditto,
            ArchiveToolArg::Unzip => ArchiveTool::Unzip,
            ArchiveToolArg::Builtin => ArchiveTool::Builtin,
        }
    }
}

#[derive(Args)]
pub struct InstallCommand {
    /// Path to a downloaded update package (.zip)
    pub archive: PathBuf,

    /// How to unpack the package (defaults to ditto on macOS)
    #[arg(long, value_enum)]
    pub tool: Option<ArchiveToolArg>,

    /// Prepare the replacement but don't restart
    #[arg(long)]
    pub dry_run: bool,
}

impl InstallCommand {
    pub async fn run(self, global_args: GlobalArgs) -> Result<()> {
        let config = global_args.config()?;
        let mut installer = Installer::new(&config)?;
        if let Some(tool) = self.tool {
            installer = installer.with_archive_tool(tool.into());
        }

        let outcome = installer
            .install(&self.archive)
            .await
            .context(format!("Failed to install {}", self.archive.display()))?;
        ui::info(&outcome.to_string());

        match outcome {
            InstallOutcome::Relaunch { swap, script, .. } => {
                if self.dry_run {
                    ui::info(&format!("Replacement script: {}", script.display()));
                    ui::detail(&swap.render_script());
                    return Ok(());
                }
                match installer::handoff(&script)? {}
            }
            InstallOutcome::ManualInstall { bundle } => {
                ui::warning("PlayerX is not running from an application bundle.");
                ui::tip(&format!(
                    "Move {} into your Applications folder to finish updating.",
                    bundle.display()
                ));
                TerminalWindow::new()
                    .reveal_in_file_browser(&bundle)
                    .context(format!("Failed to reveal {}", bundle.display()))?;
                Ok(())
            }
        }
    }
}
