use super::EXIT_SUCCESS;
use labctl_core::{ComposeExtras, Engine};

pub fn run(
    engine: &Engine,
    extension: Option<&str>,
    extras: &ComposeExtras,
    shell: &str,
) -> Result<u8, String> {
    engine
        .enter(extension, extras, shell)
        .map_err(|e| e.to_string())?;
    Ok(EXIT_SUCCESS)
}
