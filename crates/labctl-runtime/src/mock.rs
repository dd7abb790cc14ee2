use crate::backend::{ComposeSpec, ContainerRuntime, InstanceState};
use crate::x11::{DisplayHost, DisplayProbe};
use crate::RuntimeError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type Files = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct MockState {
    instances: BTreeMap<String, InstanceState>,
    volumes: BTreeSet<String>,
    instance_files: BTreeMap<PathBuf, Files>,
    volume_files: BTreeMap<String, Files>,
    calls: Vec<String>,
    last_spec: Option<ComposeSpec>,
}

/// In-memory runtime: tracks instances and volumes, records every call.
#[derive(Debug, Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    fn record(&self, call: String) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        let mut state = self.lock()?;
        state.calls.push(call);
        Ok(state)
    }

    /// Calls seen so far, e.g. `"up isaac-lab-base"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .count()
    }

    pub fn last_spec(&self) -> Option<ComposeSpec> {
        self.lock().ok().and_then(|s| s.last_spec.clone())
    }

    pub fn set_instance(&self, container: &str, state: InstanceState) {
        if let Ok(mut s) = self.lock() {
            if state == InstanceState::Absent {
                s.instances.remove(container);
            } else {
                s.instances.insert(container.to_owned(), state);
            }
        }
    }

    /// Make `file` visible at `container_path` inside any existing instance.
    pub fn seed_instance_file(&self, container_path: &Path, file: &str, content: &str) {
        if let Ok(mut s) = self.lock() {
            s.instance_files
                .entry(container_path.to_path_buf())
                .or_default()
                .insert(file.to_owned(), content.to_owned());
        }
    }

    /// Create `volume` holding `file`.
    pub fn seed_volume_file(&self, volume: &str, file: &str, content: &str) {
        if let Ok(mut s) = self.lock() {
            s.volumes.insert(volume.to_owned());
            s.volume_files
                .entry(volume.to_owned())
                .or_default()
                .insert(file.to_owned(), content.to_owned());
        }
    }
}

fn write_files(files: &Files, dest: &Path) -> Result<(), RuntimeError> {
    std::fs::create_dir_all(dest)?;
    for (name, content) in files {
        std::fs::write(dest.join(name), content)?;
    }
    Ok(())
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn status(&self, container: &str) -> Result<InstanceState, RuntimeError> {
        let state = self.lock()?;
        Ok(state
            .instances
            .get(container)
            .copied()
            .unwrap_or(InstanceState::Absent))
    }

    fn build(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("build {}", spec.project))?;
        state.last_spec = Some(spec.clone());
        Ok(())
    }

    fn up(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        for file in &spec.files {
            if !file.is_file() {
                return Err(RuntimeError::CommandFailed {
                    command: format!("compose up {}", spec.project),
                    status: "exit status: 1".to_owned(),
                    stderr: format!("open {}: no such file or directory", file.display()),
                });
            }
        }
        let mut state = self.record(format!("up {}", spec.project))?;
        state
            .instances
            .insert(spec.project.clone(), InstanceState::Running);
        state.volumes.extend(spec.volumes.iter().cloned());
        state.last_spec = Some(spec.clone());
        Ok(())
    }

    fn down(&self, spec: &ComposeSpec) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("down {}", spec.project))?;
        state.instances.remove(&spec.project);
        state.last_spec = Some(spec.clone());
        Ok(())
    }

    fn enter(&self, container: &str, shell: &str) -> Result<(), RuntimeError> {
        let state = self.record(format!("enter {container} {shell}"))?;
        if state.instances.get(container) == Some(&InstanceState::Running) {
            Ok(())
        } else {
            Err(RuntimeError::ExecFailed(format!(
                "container {container} is not running"
            )))
        }
    }

    fn copy_from_instance(
        &self,
        container: &str,
        source: &Path,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        let state = self.record(format!("cp {container} {}", source.display()))?;
        if !state.instances.contains_key(container) {
            return Err(RuntimeError::SourceMissing(format!("no such container: {container}")));
        }
        let files = state
            .instance_files
            .get(source)
            .ok_or_else(|| RuntimeError::SourceMissing(format!("{container}:{}", source.display())))?;
        write_files(files, dest)
    }

    fn copy_from_volume(
        &self,
        volume: &str,
        source: &Path,
        image: &str,
        dest: &Path,
    ) -> Result<(), RuntimeError> {
        let state = self.record(format!("cp-volume {volume} {image}"))?;
        let files = state
            .volume_files
            .get(volume)
            .ok_or_else(|| RuntimeError::SourceMissing(format!("volume '{volume}' ({})", source.display())))?;
        write_files(files, dest)
    }

    fn list_volumes(&self) -> Result<Vec<String>, RuntimeError> {
        let state = self.lock()?;
        Ok(state.volumes.iter().cloned().collect())
    }
}

/// Display host with a fixed probe; X authority files get stub content.
#[derive(Debug)]
pub struct MockDisplay {
    probe: DisplayProbe,
    writes: Mutex<Vec<PathBuf>>,
}

impl MockDisplay {
    pub fn new(probe: DisplayProbe) -> Self {
        Self {
            probe,
            writes: Mutex::new(Vec::new()),
        }
    }

    /// A host with `DISPLAY=:0`, the socket directory, and xauth.
    pub fn with_display() -> Self {
        Self::new(DisplayProbe {
            display: Some(":0".to_owned()),
            socket_dir_present: true,
            xauth_available: true,
        })
    }

    /// A headless host.
    pub fn headless() -> Self {
        Self::new(DisplayProbe::default())
    }

    pub fn xauth_writes(&self) -> Vec<PathBuf> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl DisplayHost for MockDisplay {
    fn probe(&self) -> DisplayProbe {
        self.probe.clone()
    }

    fn write_xauth(&self, display: &str, dest: &Path) -> Result<(), RuntimeError> {
        std::fs::write(dest, format!("mock-xauth:{display}"))?;
        self.writes
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))?
            .push(dest.to_path_buf());
        Ok(())
    }
}
