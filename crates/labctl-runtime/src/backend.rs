use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Observed state of a named container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Absent,
    Running,
    Stopped,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Absent => write!(f, "absent"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything a compose invocation needs, with every fragment on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSpec {
    pub project: String,
    /// Working directory; relative paths inside fragments resolve from here.
    pub workdir: PathBuf,
    pub files: Vec<PathBuf>,
    pub env_files: Vec<PathBuf>,
    /// Variables exported to the compose process.
    pub env: Vec<(String, String)>,
    /// Named volumes the fragments declare.
    pub volumes: Vec<String>,
}

impl ComposeSpec {
    /// `compose --project-name P --file F... --env-file E...`, ready for a
    /// subcommand to be appended.
    pub fn compose_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["compose".into(), "--project-name".into()];
        args.push(self.project.clone().into());
        for file in &self.files {
            args.push("--file".into());
            args.push(file.clone().into_os_string());
        }
        for env_file in &self.env_files {
            args.push("--env-file".into());
            args.push(env_file.clone().into_os_string());
        }
        args
    }
}

pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    fn status(&self, container: &str) -> Result<InstanceState, RuntimeError>;

    /// Build the image(s) described by the spec.
    fn build(&self, spec: &ComposeSpec) -> Result<(), RuntimeError>;

    /// Create and start the instance in the background.
    fn up(&self, spec: &ComposeSpec) -> Result<(), RuntimeError>;

    /// Remove the instance. Named volumes are left in place.
    fn down(&self, spec: &ComposeSpec) -> Result<(), RuntimeError>;

    /// Interactive shell inside a running instance.
    fn enter(&self, container: &str, shell: &str) -> Result<(), RuntimeError>;

    /// Copy `source` out of an existing (running or stopped) instance into `dest`.
    fn copy_from_instance(
        &self,
        container: &str,
        source: &Path,
        dest: &Path,
    ) -> Result<(), RuntimeError>;

    /// Copy the contents of a named volume into `dest` without an instance.
    fn copy_from_volume(
        &self,
        volume: &str,
        source: &Path,
        image: &str,
        dest: &Path,
    ) -> Result<(), RuntimeError>;

    fn list_volumes(&self) -> Result<Vec<String>, RuntimeError>;
}

/// Lets callers keep a handle on a runtime they hand to the engine.
impl<R: ContainerRuntime + ?Sized> ContainerRuntime for std::sync::Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn available(&self) -> bool {
        (**self).available()
    }

    fn status(&self, container: &str) -> Result<InstanceState, RuntimeError> {
        (**self).status(container)
    }

    fn build(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        (**self).build(spec)
    }

    fn up(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        (**self).up(spec)
    }

    fn down(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        (**self).down(spec)
    }

    fn enter(&self, container: &str, shell: &str) -> Result<(), RuntimeError> {
        (**self).enter(container, shell)
    }

    fn copy_from_instance(
        &self,
        container: &str,
        source: &Path,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        (**self).copy_from_instance(container, source, dest)
    }

    fn copy_from_volume(
        &self,
        volume: &str,
        source: &Path,
        image: &str,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        (**self).copy_from_volume(volume, source, image, dest)
    }

    fn list_volumes(&self) -> Result<Vec<String>, RuntimeError> {
        (**self).list_volumes()
    }
}

pub fn select_backend(name: &str) -> Result<Box<dyn ContainerRuntime>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerRuntime::new())),
        "mock" => Ok(Box::new(crate::mock::MockRuntime::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
