use std::fmt;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_exists(name: &str) -> bool {
    which::which(name).is_ok()
}

fn compose_plugin_works() -> bool {
    Command::new("docker")
        .args(["compose", "version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Check what the docker backend needs. Empty means all prerequisites are met.
pub fn check_docker_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("docker") {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "container runtime",
            install_hint: "see https://docs.docker.com/engine/install/",
        });
    } else if !compose_plugin_works() {
        missing.push(MissingPrereq {
            name: "docker compose",
            purpose: "layered compose fragments",
            install_hint: "apt install docker-compose-plugin | dnf install docker-compose-plugin",
        });
    }

    missing
}

/// Check what X11 forwarding needs on the host.
pub fn check_x11_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_exists("xauth") {
        missing.push(MissingPrereq {
            name: "xauth",
            purpose: "X11 credentials for display forwarding",
            install_hint: "apt install xauth | dnf install xorg-x11-xauth | pacman -S xorg-xauth",
        });
    }
    missing
}

pub fn format_missing(missing: &[MissingPrereq]) -> String {
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        msg.push_str(&m.to_string());
        msg.push('\n');
    }
    msg
}
