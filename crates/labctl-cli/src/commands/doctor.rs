use super::{colorize_state, EXIT_FAILURE, EXIT_SUCCESS};
use labctl_core::Engine;
use labctl_store::PersistedConfig;

pub fn run(engine: &Engine, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_prereqs(engine, &mut checks, &mut all_pass);
    check_context(engine, &mut checks, &mut all_pass);
    check_instances(engine, &mut checks, json_output);

    print_results(&checks, all_pass, json_output)
}

fn check_prereqs(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if engine.runtime_name() == "docker" {
        let missing = labctl_runtime::check_docker_prereqs();
        if missing.is_empty() {
            checks.push(Check::pass("runtime_prereqs", "docker and docker compose found"));
        } else {
            *all_pass = false;
            checks.push(Check::fail(
                "runtime_prereqs",
                &labctl_runtime::format_missing(&missing),
            ));
        }
    } else {
        checks.push(Check::info(
            "runtime_prereqs",
            &format!("using the {} runtime", engine.runtime_name()),
        ));
    }

    let missing = labctl_runtime::check_x11_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass("x11_prereqs", "xauth found"));
    } else {
        checks.push(Check::warn(
            "x11_prereqs",
            "xauth not found (X11 forwarding will not work)",
        ));
    }
}

fn check_context(engine: &Engine, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = engine.layout();
    if !layout.root().is_dir() {
        *all_pass = false;
        checks.push(Check::fail(
            "context",
            &format!("context directory {} not found", layout.root().display()),
        ));
        return;
    }
    checks.push(Check::pass(
        "context",
        &format!("context directory {}", layout.root().display()),
    ));

    for (name, path) in [
        ("base_fragment", layout.base_fragment()),
        ("base_env_file", layout.base_env_file()),
    ] {
        if path.is_file() {
            checks.push(Check::pass(name, &format!("{} present", path.display())));
        } else {
            *all_pass = false;
            checks.push(Check::fail(name, &format!("{} missing", path.display())));
        }
    }
    let x11 = layout.x11_fragment();
    if !x11.is_file() {
        checks.push(Check::warn(
            "x11_fragment",
            &format!("{} missing (X11 forwarding cannot be enabled)", x11.display()),
        ));
    }

    checks.push(Check::info(
        "extensions",
        &format!("extensions: {}", engine.registry().names().join(", ")),
    ));

    let prefs = PersistedConfig::load(&layout.state_file());
    checks.push(Check::info(
        "x11_preference",
        &format!("X11 forwarding: {}", prefs.x11_forwarding),
    ));
}

fn check_instances(engine: &Engine, checks: &mut Vec<Check>, json_output: bool) {
    if !engine.runtime_available() {
        checks.push(Check::warn(
            "instances",
            "runtime not reachable; instance states unknown",
        ));
        return;
    }
    match engine.list() {
        Ok(statuses) => {
            for status in statuses {
                let state = status.state.to_string();
                let shown = if json_output {
                    state
                } else {
                    colorize_state(&state)
                };
                checks.push(Check::info(
                    &format!("instance_{}", status.name),
                    &format!("{}: {shown}", status.container),
                ));
            }
        }
        Err(e) => checks.push(Check::warn(
            "instances",
            &format!("cannot query instances: {e}"),
        )),
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("labctl doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message.trim_end());
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
