use crate::ui;
use anyhow::Result;
use clap::Args;
use playerx_lib::version::{DottedVersion, compare};

#[derive(Args)]
pub struct CompareCommand {
    /// First version (e.g., 1.2.10)
    pub a: String,

    /// Second version (e.g., 1.2.3)
    pub b: String,
}

impl CompareCommand {
    pub fn run(self) -> Result<()> {
        let result = compare(&self.a, &self.b);
        println!("{result}");

        let (a, b) = (DottedVersion::parse(&self.a), DottedVersion::parse(&self.b));
        let relation = match result {
            1 => "newer than",
            -1 => "older than",
            _ => "the same as",
        };
        ui::info(&format!("{a} is {relation} {b}"));
        Ok(())
    }
}
