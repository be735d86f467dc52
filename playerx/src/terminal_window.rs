use crate::ui;
use playerx_lib::host::{HostWindow, Notice, NoticeLevel, UpdateChoice, UpdatePrompt};
use playerx_lib::progress::{ProgressReporter, SpanProgress};
use std::io::{BufRead, IsTerminal};
use std::path::Path;
use std::sync::Arc;

/// Shows notices and prompts on the terminal. Prompts are only answered when
/// stdin is a terminal; otherwise they resolve to their default.
#[derive(Debug, Default)]
pub struct TerminalWindow;

impl TerminalWindow {
    pub fn new() -> Self {
        Self
    }
}

impl HostWindow for TerminalWindow {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info => ui::info(&format!("{}: {}", notice.title, notice.message)),
            NoticeLevel::Error => ui::error(&format!("{}: {}", notice.title, notice.message)),
        }
        ui::detail(&notice.detail);
    }

    fn choose(&self, prompt: &UpdatePrompt) -> Option<UpdateChoice> {
        ui::info(&prompt.title);
        ui::info(&prompt.message);
        ui::detail(&prompt.detail);
        for (i, choice) in prompt.choices.iter().enumerate() {
            ui::info(&format!("  {}) {}", i + 1, choice));
        }

        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return None;
        }
        ui::question(&format!(
            "Choose 1-{} (default: {})",
            prompt.choices.len(),
            prompt.default
        ));

        let answer = read_answer(stdin.lock())?;
        parse_choice(&answer, &prompt.choices)
    }

    fn open_external(&self, url: &str) -> std::io::Result<()> {
        ui::info(&format!("Opening {url}"));
        open::that(url)
    }

    fn reveal_in_file_browser(&self, path: &Path) -> std::io::Result<()> {
        #[cfg(target_os = "macos")]
        {
            let status = std::process::Command::new("open")
                .arg("-R")
                .arg(path)
                .status()?;
            if !status.success() {
                return Err(std::io::Error::other(format!("open -R exited with {status}")));
            }
            Ok(())
        }

        #[cfg(not(target_os = "macos"))]
        {
            open::that(path.parent().unwrap_or(path))
        }
    }

    fn progress(&self) -> Arc<dyn ProgressReporter> {
        Arc::new(SpanProgress::new())
    }
}

/// Reads one line of input. The wait happens inside `block_in_place` so the
/// runtime worker running the check hands its other tasks off meanwhile.
/// Requires the multi-threaded runtime.
fn read_answer(mut input: impl BufRead) -> Option<String> {
    tokio::task::block_in_place(|| {
        let mut answer = String::new();
        input.read_line(&mut answer).ok()?;
        Some(answer)
    })
}

/// A 1-based index into `choices`. Anything else counts as dismissing the
/// prompt.
fn parse_choice(answer: &str, choices: &[UpdateChoice]) -> Option<UpdateChoice> {
    let index = answer.trim().parse::<usize>().ok()?;
    choices.get(index.checked_sub(1)?).copied()
}
