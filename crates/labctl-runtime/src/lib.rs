//! Execution layer for labctl.
//!
//! This crate talks to the outside world: the pluggable `ContainerRuntime`
//! trait with a `docker compose` backend and an in-memory mock, the
//! `DisplayHost` trait that probes the X11 session and synthesizes X
//! authority files, and prerequisite checks with install hints.

pub mod backend;
pub mod docker;
pub mod mock;
pub mod prereq;
pub mod terminal;
pub mod x11;

pub use backend::{select_backend, ComposeSpec, ContainerRuntime, InstanceState};
pub use mock::{MockDisplay, MockRuntime};
pub use prereq::{check_docker_prereqs, check_x11_prereqs, format_missing, MissingPrereq};
pub use x11::{xauth_file, DisplayHost, DisplayProbe, SystemDisplay, X11_SOCKET_DIR};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("`{command}` failed ({status}){}", format_stderr(stderr))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("copy source not found: {0}")]
    SourceMissing(String),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("display unavailable: {0}")]
    DisplayUnavailable(String),
}

fn format_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_carries_runtime_diagnostic() {
        let e = RuntimeError::CommandFailed {
            command: "docker compose up".to_owned(),
            status: "exit status: 1".to_owned(),
            stderr: "no such service: isaac-lab-base\n".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("docker compose up"));
        assert!(msg.ends_with("no such service: isaac-lab-base"));
    }

    #[test]
    fn command_failed_without_stderr() {
        let e = RuntimeError::CommandFailed {
            command: "docker compose build".to_owned(),
            status: "exit status: 17".to_owned(),
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "`docker compose build` failed (exit status: 17)");
    }
}
