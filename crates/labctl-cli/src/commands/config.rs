use super::{json_pretty, EXIT_SUCCESS};
use labctl_core::{ComposeExtras, Engine};
use std::path::Path;

pub fn run(
    engine: &Engine,
    extension: Option<&str>,
    extras: &ComposeExtras,
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let outcome = engine
        .config(extension, extras, output)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else if let Some(path) = &outcome.output {
        println!("wrote merged configuration to {}", path.display());
    } else {
        print!("{}", outcome.merged);
    }
    Ok(EXIT_SUCCESS)
}
