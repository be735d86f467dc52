use colored::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Error,
    Info,
    Warning,
    Tip,
    Question,
}

/// Renders `msg` in the colours and prefix of `tone`.
pub fn styled(tone: Tone, msg: &str) -> String {
    match tone {
        Tone::Success => format!("{} {}", "✓".green(), msg.green()),
        Tone::Error => format!("{} {}", "Error:".red(), msg.red()),
        Tone::Info => msg.to_string(),
        Tone::Warning => msg.yellow().to_string(),
        Tone::Tip => format!("{} {}", "Tip:".dimmed(), msg.dimmed()),
        Tone::Question => format!("{} {}", "[?]".magenta(), msg.magenta()),
    }
}

pub fn say(tone: Tone, msg: &str) {
    tracing::info!("{}", styled(tone, msg));
}

pub fn success(msg: &str) {
    say(Tone::Success, msg);
}

pub fn error(msg: &str) {
    say(Tone::Error, msg);
}

pub fn info(msg: &str) {
    say(Tone::Info, msg);
}

pub fn warning(msg: &str) {
    say(Tone::Warning, msg);
}

pub fn tip(msg: &str) {
    say(Tone::Tip, msg);
}

pub fn question(msg: &str) {
    say(Tone::Question, msg);
}

/// Prints an indented block of secondary text, skipping blank lines.
pub fn detail(msg: &str) {
    for line in msg.lines().filter(|line| !line.trim().is_empty()) {
        tracing::info!("  {}", line.dimmed());
    }
}
