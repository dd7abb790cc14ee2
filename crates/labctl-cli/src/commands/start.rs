use super::{colorize_state, json_pretty, EXIT_SUCCESS};
use dialoguer::Confirm;
use labctl_core::{ComposeExtras, Engine};
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use tracing::warn;

pub fn run(
    engine: &Engine,
    extension: Option<&str>,
    extras: &ComposeExtras,
    x11_answer: Option<bool>,
    json: bool,
) -> Result<u8, String> {
    let statefile = engine.layout().state_file();
    let outcome = engine
        .start(extension, extras, || {
            x11_answer.unwrap_or_else(|| ask_x11(&statefile))
        })
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else if outcome.already_running {
        println!(
            "{} is already {}",
            outcome.container,
            colorize_state("running")
        );
    } else {
        println!(
            "started {} ({}), X11 forwarding {}",
            outcome.container,
            outcome.image,
            colorize_state(&outcome.x11.to_string())
        );
    }
    Ok(EXIT_SUCCESS)
}

/// Ask once whether to forward X11. Without a terminal the answer is no.
fn ask_x11(statefile: &Path) -> bool {
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        eprintln!(
            "no terminal to ask about X11 forwarding; recording it as disabled (delete {} to be asked again)",
            statefile.display()
        );
        return false;
    }
    Confirm::new()
        .with_prompt(
            "Enable X11 forwarding? GUI applications in the container will use your display",
        )
        .default(false)
        .interact()
        .unwrap_or_else(|e| {
            warn!("X11 prompt failed: {e}");
            false
        })
}
