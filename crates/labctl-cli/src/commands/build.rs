use super::{json_pretty, EXIT_SUCCESS};
use labctl_core::{ComposeExtras, Engine};

pub fn run(
    engine: &Engine,
    extension: Option<&str>,
    extras: &ComposeExtras,
    json: bool,
) -> Result<u8, String> {
    let outcome = engine
        .build(extension, extras)
        .map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        println!("built {}", outcome.image);
    }
    Ok(EXIT_SUCCESS)
}
