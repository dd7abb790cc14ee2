use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_PARTIAL_COPY, EXIT_SUCCESS};
use console::Style;
use labctl_core::{ComposeExtras, Engine, ARTIFACT_ITEMS};
use std::path::Path;

pub fn run(
    engine: &Engine,
    extension: Option<&str>,
    extras: &ComposeExtras,
    dest: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let pb = if json {
        None
    } else {
        Some(spinner("copying artifacts..."))
    };

    let report = match engine.copy(extension, extras, dest) {
        Ok(r) => r,
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "copy failed");
            }
            return Err(e.to_string());
        }
    };

    if let Some(ref pb) = pb {
        let summary = format!(
            "copied {} of {} artifact directories to {}",
            report.copied.len(),
            ARTIFACT_ITEMS.len(),
            report.destination.display()
        );
        if report.is_complete() {
            spin_ok(pb, &summary);
        } else {
            spin_fail(pb, &summary);
        }
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        let red = Style::new().red();
        for failure in &report.failed {
            println!("  {} {}: {}", red.apply_to("✗"), failure.item, failure.reason);
        }
    }

    Ok(if report.is_complete() {
        EXIT_SUCCESS
    } else {
        EXIT_PARTIAL_COPY
    })
}
