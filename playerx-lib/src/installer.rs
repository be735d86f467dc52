use crate::config::Config;
use crate::error::InstallError;
use crate::logging::spinner_style;
use crate::platform::Platform;
use anyhow::Result;
use std::convert::Infallible;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use walkdir::WalkDir;

const BUNDLE_EXTENSION: &str = "app";
const QUARANTINE_ATTRIBUTE: &str = "com.apple.quarantine";
/// How long the swap script waits for the parent process to exit.
const RELAUNCH_DELAY: Duration = Duration::from_secs(1);

/// How update archives are unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveTool {
    /// `ditto -x -k`, which keeps bundle metadata and symlinks intact.
    Ditto,
    /// `unzip -q -o`
    Unzip,
    /// The in-process `zip` reader.
    Builtin,
}

impl ArchiveTool {
    pub fn platform_default(platform: Platform) -> Self {
        match platform {
            Platform::MacOs => ArchiveTool::Ditto,
            _ => ArchiveTool::Builtin,
        }
    }
}

/// Paths involved in one install attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub archive_path: PathBuf,
    pub extraction_dir: PathBuf,
    /// The bundle found in the unpacked archive.
    pub bundle_path: PathBuf,
    /// The bundle of the running application.
    pub installed_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapStep {
    Wait(Duration),
    /// Abort unless the directory exists.
    RequireDir(PathBuf),
    Remove(PathBuf),
    Move { from: PathBuf, to: PathBuf },
    Launch(PathBuf),
}

/// The steps run by the detached helper once the application has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    pub steps: Vec<SwapStep>,
}

impl SwapPlan {
    /// Replaces `installed` with `replacement` and relaunches it. The old
    /// bundle is only removed once the replacement is known to be present.
    pub fn replace(replacement: &Path, installed: &Path) -> Self {
        Self {
            steps: vec![
                SwapStep::Wait(RELAUNCH_DELAY),
                SwapStep::RequireDir(replacement.to_path_buf()),
                SwapStep::Remove(installed.to_path_buf()),
                SwapStep::Move {
                    from: replacement.to_path_buf(),
                    to: installed.to_path_buf(),
                },
                SwapStep::Launch(installed.to_path_buf()),
            ],
        }
    }

    pub fn render_script(&self) -> String {
        let mut script = String::from("#!/bin/sh\nset -e\n");
        for step in &self.steps {
            let line = match step {
                SwapStep::Wait(duration) => format!("sleep {}", duration.as_secs_f64()),
                SwapStep::RequireDir(path) => {
                    format!("[ -d {} ] || exit 1", shell_quote(path))
                }
                SwapStep::Remove(path) => format!("rm -rf {}", shell_quote(path)),
                SwapStep::Move { from, to } => {
                    format!("mv {} {}", shell_quote(from), shell_quote(to))
                }
                SwapStep::Launch(path) => format!("open {}", shell_quote(path)),
            };
            script.push_str(&line);
            script.push('\n');
        }
        script
    }
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The swap script is written; hand it to [`handoff`].
    Relaunch {
        plan: InstallPlan,
        swap: SwapPlan,
        script: PathBuf,
    },
    /// The running application is not inside a bundle, so the user has to
    /// move the new bundle into place themselves.
    ManualInstall { bundle: PathBuf },
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallOutcome::Relaunch { plan, .. } => write!(
                f,
                "Ready to replace {} with {}",
                plan.installed_path.display(),
                plan.bundle_path.display()
            ),
            InstallOutcome::ManualInstall { bundle } => {
                write!(f, "Manual installation required: {}", bundle.display())
            }
        }
    }
}

pub struct Installer {
    extraction_dir: PathBuf,
    script_dir: PathBuf,
    archive_tool: ArchiveTool,
    running_executable: PathBuf,
    platform: Platform,
}

impl Installer {
    pub fn new(config: &Config) -> Result<Self, InstallError> {
        let running_executable =
            std::env::current_exe().map_err(|e| InstallError::RunningApp(e.to_string()))?;
        let platform = Platform::from_os(&config.os);
        Ok(Self {
            extraction_dir: config.extraction_dir.clone(),
            script_dir: std::env::temp_dir(),
            archive_tool: ArchiveTool::platform_default(platform),
            running_executable,
            platform,
        })
    }

    pub fn with_archive_tool(mut self, archive_tool: ArchiveTool) -> Self {
        self.archive_tool = archive_tool;
        self
    }

    pub fn with_running_executable(mut self, running_executable: &Path) -> Self {
        self.running_executable = running_executable.to_path_buf();
        self
    }

    pub fn with_script_dir(mut self, script_dir: &Path) -> Self {
        self.script_dir = script_dir.to_path_buf();
        self
    }

    pub fn ensure_supported(&self) -> Result<(), InstallError> {
        if self.platform.supports_auto_install() {
            Ok(())
        } else {
            Err(InstallError::Unsupported(self.platform.to_string()))
        }
    }

    #[instrument(skip_all)]
    pub async fn install(&self, archive_path: &Path) -> Result<InstallOutcome, InstallError> {
        self.ensure_supported()?;

        let current_span = tracing::Span::current();
        if let Ok(style) = spinner_style("{msg}") {
            current_span.pb_set_style(&style);
        }
        current_span.pb_set_message("Installing update...");
        current_span.pb_set_finish_message("Installing update... Done");

        self.prepare_extraction_dir()?;

        tracing::debug!("Extracting {}...", archive_path.display());
        self.extract(archive_path).await?;

        let bundle_path = find_bundle(&self.extraction_dir)?;
        strip_quarantine(&bundle_path).await;

        let Some(installed_path) = running_bundle(&self.running_executable) else {
            tracing::warn!(
                "{} is not inside an application bundle",
                self.running_executable.display()
            );
            return Ok(InstallOutcome::ManualInstall {
                bundle: bundle_path,
            });
        };

        let plan = InstallPlan {
            archive_path: archive_path.to_path_buf(),
            extraction_dir: self.extraction_dir.clone(),
            bundle_path,
            installed_path,
        };
        let swap = SwapPlan::replace(&plan.bundle_path, &plan.installed_path);
        let script = self.write_script(&swap)?;
        tracing::debug!("Swap script written to {}", script.display());

        Ok(InstallOutcome::Relaunch { plan, swap, script })
    }

    fn prepare_extraction_dir(&self) -> Result<(), InstallError> {
        if self.extraction_dir.exists()
            && let Err(e) = fs::remove_dir_all(&self.extraction_dir)
        {
            tracing::debug!("Failed to clear extraction directory: {}", e);
        }
        fs::create_dir_all(&self.extraction_dir).map_err(|source| InstallError::Scratch {
            path: self.extraction_dir.clone(),
            source,
        })
    }

    async fn extract(&self, archive_path: &Path) -> Result<(), InstallError> {
        let (program, args): (&str, Vec<&std::ffi::OsStr>) = match self.archive_tool {
            ArchiveTool::Ditto => (
                "ditto",
                vec![
                    "-x".as_ref(),
                    "-k".as_ref(),
                    archive_path.as_os_str(),
                    self.extraction_dir.as_os_str(),
                ],
            ),
            ArchiveTool::Unzip => (
                "unzip",
                vec![
                    "-q".as_ref(),
                    "-o".as_ref(),
                    archive_path.as_os_str(),
                    "-d".as_ref(),
                    self.extraction_dir.as_os_str(),
                ],
            ),
            ArchiveTool::Builtin => {
                let archive = archive_path.to_path_buf();
                let destination = self.extraction_dir.clone();
                return tokio::task::spawn_blocking(move || extract_zip(&archive, &destination))
                    .await
                    .map_err(|e| InstallError::Extract(e.to_string()))?
                    .map_err(|e| InstallError::Extract(format!("{e:#}")));
            }
        };

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| InstallError::Extract(format!("Failed to run {program}: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(InstallError::Extract(if stderr.is_empty() {
                format!("{program} exited with {}", output.status)
            } else {
                stderr
            }));
        }
        Ok(())
    }

    fn write_script(&self, swap: &SwapPlan) -> Result<PathBuf, InstallError> {
        let script = self
            .script_dir
            .join(format!("playerx-update-{}.sh", std::process::id()));
        let script_error = |source| InstallError::Script {
            path: script.clone(),
            source,
        };

        fs::create_dir_all(&self.script_dir).map_err(script_error)?;
        fs::write(&script, swap.render_script()).map_err(script_error)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
                .map_err(script_error)?;
        }
        Ok(script)
    }
}

fn extract_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(outpath) = entry.enclosed_name().map(|path| destination.join(path)) else {
            continue;
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;
        }

        // Keeps the bundle executable runnable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(())
}

fn is_bundle(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == BUNDLE_EXTENSION)
}

/// Finds the application bundle in an unpacked archive, either at the top
/// level or inside a single wrapping directory.
pub fn find_bundle(extracted: &Path) -> Result<PathBuf, InstallError> {
    let mut bundles: Vec<(usize, PathBuf)> = WalkDir::new(extracted)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() < 2 || !entry.path().parent().is_some_and(is_bundle))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir() && is_bundle(entry.path()))
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();

    bundles.sort_by_key(|(depth, _)| *depth);
    let mut bundles = bundles.into_iter();
    let (_, bundle) = bundles.next().ok_or(InstallError::NoBundle)?;
    if let Some((_, ignored)) = bundles.next() {
        tracing::warn!(
            "Package contains more than one bundle, ignoring {}",
            ignored.display()
        );
    }
    Ok(bundle)
}

/// Best effort: a bundle that keeps the attribute still installs, the user
/// just sees a Gatekeeper prompt on first launch.
async fn strip_quarantine(bundle: &Path) {
    let result = Command::new("xattr")
        .arg("-dr")
        .arg(QUARANTINE_ATTRIBUTE)
        .arg(bundle)
        .stdin(Stdio::null())
        .output()
        .await;
    match result {
        Ok(output) if output.status.success() => {}
        Ok(output) => tracing::debug!("xattr exited with {}", output.status),
        Err(e) => tracing::debug!("Failed to run xattr: {}", e),
    }
}

/// `<X>.app/Contents/MacOS/<exe>` resolves to `<X>.app`.
pub fn running_bundle(executable: &Path) -> Option<PathBuf> {
    let bundle = executable.parent()?.parent()?.parent()?;
    is_bundle(bundle).then(|| bundle.to_path_buf())
}

/// Starts the swap script in its own process group and exits. The script
/// outlives this process, which it is about to delete.
pub fn handoff(script: &Path) -> Result<Infallible, InstallError> {
    let mut command = std::process::Command::new("/bin/sh");
    command
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command.spawn().map_err(InstallError::Handoff)?;
    tracing::info!("Restarting to finish the update");
    std::process::exit(0)
}
