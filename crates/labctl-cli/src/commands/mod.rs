pub mod build;
pub mod completions;
pub mod config;
pub mod copy;
pub mod doctor;
pub mod enter;
pub mod man_pages;
pub mod start;
pub mod stop;

use indicatif::{ProgressBar, ProgressStyle};
use labctl_core::ComposeExtras;
use std::path::PathBuf;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION: u8 = 2;
pub const EXIT_NOT_RUNNING: u8 = 3;
pub const EXIT_DISPLAY_AUTH: u8 = 4;
pub const EXIT_PARTIAL_COPY: u8 = 5;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Resolve user-supplied paths against the working directory, since compose
/// itself runs from the context directory.
pub fn compose_extras(files: &[PathBuf], env_files: &[PathBuf]) -> Result<ComposeExtras, String> {
    let cwd = std::env::current_dir().map_err(|e| format!("cannot read working directory: {e}"))?;
    let absolute = |p: &PathBuf| {
        if p.is_absolute() {
            p.clone()
        } else {
            cwd.join(p)
        }
    };
    Ok(ComposeExtras {
        fragments: files.iter().map(absolute).collect(),
        env_files: env_files.iter().map(absolute).collect(),
    })
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finished_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "running" => Style::new().green().bold().apply_to(state).to_string(),
        "stopped" => Style::new().yellow().apply_to(state).to_string(),
        "absent" => Style::new().dim().apply_to(state).to_string(),
        "enabled" => Style::new().cyan().apply_to(state).to_string(),
        "disabled" | "unset" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}
