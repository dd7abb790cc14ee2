use crate::backend::{ComposeSpec, ContainerRuntime, InstanceState};
use crate::terminal;
use crate::RuntimeError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Mount point of a volume inside the throwaway copy container.
const VOLUME_COPY_SRC: &str = "/labctl-src";
const VOLUME_COPY_DST: &str = "/labctl-dst";

/// `docker` / `docker compose` backed runtime.
pub struct DockerRuntime {
    program: PathBuf,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self {
            program: which::which("docker").unwrap_or_else(|_| PathBuf::from("docker")),
        }
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    fn compose(&self, spec: &ComposeSpec, subcommand: &[&str]) -> Command {
        let mut cmd = self.command();
        cmd.args(spec.compose_args())
            .args(subcommand)
            .current_dir(&spec.workdir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }

    /// Run with inherited stdio so build/up progress reaches the terminal.
    fn run_inherited(mut cmd: Command) -> Result<(), RuntimeError> {
        let command_line = describe(&cmd);
        debug!("running {command_line}");
        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: command_line,
                status: status.to_string(),
                stderr: String::new(),
            })
        }
    }

    fn run_captured(mut cmd: Command) -> Result<Output, RuntimeError> {
        let command_line = describe(&cmd);
        debug!("running {command_line}");
        let output = cmd.stdin(Stdio::null()).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(RuntimeError::CommandFailed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        self.command()
            .args(["compose", "version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn status(&self, container: &str) -> Result<InstanceState, RuntimeError> {
        let output = self
            .command()
            .args(["container", "inspect", "-f", "{{.State.Status}}", container])
            .stdin(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Ok(InstanceState::Absent);
        }
        let status = String::from_utf8_lossy(&output.stdout);
        Ok(match status.trim() {
            "running" => InstanceState::Running,
            _ => InstanceState::Stopped,
        })
    }

    fn build(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        Self::run_inherited(self.compose(spec, &["build"]))
    }

    fn up(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        Self::run_inherited(self.compose(spec, &["up", "--detach", "--remove-orphans"]))
    }

    fn down(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        Self::run_inherited(self.compose(spec, &["down"]))
    }

    fn enter(&self, container: &str, shell: &str) -> Result<(), RuntimeError> {
        terminal::print_enter_banner(container, shell);
        let mut cmd = self.command();
        cmd.args(["exec", "--interactive", "--tty", container, shell]);
        let result = Self::run_inherited(cmd);
        terminal::print_exit_banner(container);
        result
    }

    fn copy_from_instance(
        &self,
        container: &str,
        source: &Path,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        // Trailing "/." copies the directory contents into an existing dest.
        let mut from = OsString::from(format!("{container}:"));
        from.push(source.join("."));
        let mut cmd = self.command();
        cmd.arg("cp").arg(from).arg(dest);
        Self::run_captured(cmd).map(|_| ())
    }

    fn copy_from_volume(
        &self,
        volume: &str,
        source: &Path,
        image: &str,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        let exists = self
            .command()
            .args(["volume", "inspect", volume])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?
            .success();
        if !exists {
            return Err(RuntimeError::SourceMissing(format!(
                "volume '{volume}' ({})",
                source.display()
            )));
        }

        let dest = std::fs::canonicalize(dest)?;
        let mut dst_mount = dest.into_os_string();
        dst_mount.push(format!(":{VOLUME_COPY_DST}"));
        let mut cmd = self.command();
        cmd.args(["run", "--rm", "--entrypoint", "cp", "--volume"])
            .arg(format!("{volume}:{VOLUME_COPY_SRC}:ro"))
            .arg("--volume")
            .arg(dst_mount)
            .arg(image)
            .args(["-a", &format!("{VOLUME_COPY_SRC}/."), VOLUME_COPY_DST]);
        Self::run_captured(cmd).map(|_| ())
    }

    fn list_volumes(&self) -> Result<Vec<String>, RuntimeError> {
        let mut cmd = self.command();
        cmd.args(["volume", "ls", "--format", "{{.Name}}"]);
        let output = Self::run_captured(cmd)?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_command_line_is_ordered() {
        let runtime = DockerRuntime {
            program: PathBuf::from("docker"),
        };
        let spec = ComposeSpec {
            project: "isaac-lab-base".to_owned(),
            workdir: PathBuf::from("/repo/docker"),
            files: vec![PathBuf::from("docker-compose.yaml")],
            env_files: vec![PathBuf::from(".env.base")],
            env: vec![("TARGET".to_owned(), "base".to_owned())],
            volumes: Vec::new(),
        };
        let cmd = runtime.compose(&spec, &["up", "--detach", "--remove-orphans"]);
        assert_eq!(
            describe(&cmd),
            "docker compose --project-name isaac-lab-base --file docker-compose.yaml \
             --env-file .env.base up --detach --remove-orphans"
        );
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/repo/docker")));
    }

    #[test]
    fn missing_binary_reports_failure_not_panic() {
        let runtime = DockerRuntime {
            program: PathBuf::from("/nonexistent/docker-binary"),
        };
        assert!(!runtime.available());
        assert!(runtime.list_volumes().is_err());
    }
}
