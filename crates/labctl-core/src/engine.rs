use crate::artifacts::{copy_artifacts, CopyReport};
use crate::compose::{compose, merged_config, ComposeExtras};
use crate::lifecycle::{check_precondition, Command};
use crate::negotiate::{negotiation_needed, plan_x11, X11Forwarding, XauthStep};
use crate::CoreError;
use labctl_runtime::{xauth_file, ContainerRuntime, DisplayHost, InstanceState};
use labctl_schema::{ContextLayout, Extension, ExtensionRegistry};
use labctl_store::{PersistedConfig, X11Preference};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle commands for the extensions of one compose context.
///
/// The engine owns the context layout, the extension registry discovered from
/// it, and the two host seams: the container runtime and the display host.
/// The preference file is read at the start of each command and written
/// back before the command returns; nothing is cached between commands.
pub struct Engine {
    layout: ContextLayout,
    registry: ExtensionRegistry,
    runtime: Box<dyn ContainerRuntime>,
    display: Box<dyn DisplayHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartOutcome {
    pub extension: String,
    pub container: String,
    pub image: String,
    /// The instance was already running; nothing was built or started.
    pub already_running: bool,
    /// The X11 question was asked during this start.
    pub negotiated: bool,
    pub x11: X11Preference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutcome {
    pub extension: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigOutcome {
    pub extension: String,
    pub project: String,
    pub fragments: Vec<String>,
    pub env_files: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub merged: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopOutcome {
    pub extension: String,
    pub container: String,
    /// A temporary X authority directory was removed.
    pub x11_cleaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionStatus {
    pub name: String,
    pub container: String,
    pub image: String,
    pub state: InstanceState,
}

impl Engine {
    /// Create an engine for the context at `layout`, discovering user
    /// templates from its Dockerfile.
    pub fn new(
        layout: ContextLayout,
        runtime: Box<dyn ContainerRuntime>,
        display: Box<dyn DisplayHost>,
    ) -> Result<Self, CoreError> {
        let registry = ExtensionRegistry::discover(&layout)?;
        Ok(Self::with_registry(layout, registry, runtime, display))
    }

    pub fn with_registry(
        layout: ContextLayout,
        registry: ExtensionRegistry,
        runtime: Box<dyn ContainerRuntime>,
        display: Box<dyn DisplayHost>,
    ) -> Self {
        Self {
            layout,
            registry,
            runtime,
            display,
        }
    }

    #[inline]
    pub fn layout(&self) -> &ContextLayout {
        &self.layout
    }

    #[inline]
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    pub fn runtime_available(&self) -> bool {
        self.runtime.available()
    }

    pub fn resolve(&self, name: Option<&str>) -> Result<Extension, CoreError> {
        Ok(self.registry.resolve(name)?)
    }

    /// Instance state of every known extension.
    pub fn list(&self) -> Result<Vec<ExtensionStatus>, CoreError> {
        self.registry
            .iter()
            .map(|ext| {
                let container = ext.container_name();
                let state = self.runtime.status(&container)?;
                Ok(ExtensionStatus {
                    name: ext.name.clone(),
                    image: ext.image_name(),
                    container,
                    state,
                })
            })
            .collect()
    }

    /// Build and start the instance of an extension.
    ///
    /// A running instance is left alone. Otherwise the X11 decision is taken
    /// (calling `ask` only if none is recorded), the image is built, and the
    /// instance is brought up in the background.
    pub fn start(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
        ask: impl FnOnce() -> bool,
    ) -> Result<StartOutcome, CoreError> {
        let ext = self.resolve(name)?;
        let container = ext.container_name();
        let state = self.runtime.status(&container)?;
        check_precondition(Command::Start, &container, state)?;

        if state == InstanceState::Running {
            // Extra fragments are still validated against a running instance.
            compose(&self.layout, &ext, None, extras)?;
            info!("{container} is already running");
            let recorded = PersistedConfig::load(&self.layout.state_file());
            return Ok(StartOutcome {
                extension: ext.name.clone(),
                image: ext.image_name(),
                container,
                already_running: true,
                negotiated: false,
                x11: recorded.x11_forwarding,
            });
        }

        let (forwarding, negotiated) = self.prepare_x11(ask)?;
        let invocation = compose(&self.layout, &ext, forwarding.as_ref(), extras)?;
        let materialized = invocation.materialize()?;

        info!("building {}", ext.image_name());
        self.runtime.build(&materialized.spec)?;
        info!("starting {container}");
        self.runtime.up(&materialized.spec)?;

        Ok(StartOutcome {
            extension: ext.name.clone(),
            image: ext.image_name(),
            container,
            already_running: false,
            negotiated,
            x11: if forwarding.is_some() {
                X11Preference::Enabled
            } else {
                X11Preference::Disabled
            },
        })
    }

    /// Build the image without creating an instance.
    pub fn build(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
    ) -> Result<BuildOutcome, CoreError> {
        let ext = self.resolve(name)?;
        let state = self.runtime.status(&ext.container_name())?;
        check_precondition(Command::Build, &ext.container_name(), state)?;

        let invocation = compose(&self.layout, &ext, None, extras)?;
        let materialized = invocation.materialize()?;
        info!("building {}", ext.image_name());
        self.runtime.build(&materialized.spec)?;

        Ok(BuildOutcome {
            image: ext.image_name(),
            extension: ext.name,
        })
    }

    /// Render the merged configuration; optionally write it to `output`.
    /// Never calls the container runtime.
    pub fn config(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
        output: Option<&Path>,
    ) -> Result<ConfigOutcome, CoreError> {
        let ext = self.resolve(name)?;
        let recorded = PersistedConfig::load(&self.layout.state_file());
        let forwarding = if recorded.x11_enabled() {
            recorded.tmp_dir.map(|tmp_dir| X11Forwarding {
                display: self.display.probe().display.unwrap_or_default(),
                tmp_dir,
            })
        } else {
            None
        };

        let invocation = compose(&self.layout, &ext, forwarding.as_ref(), extras)?;
        let merged = merged_config(&invocation)?;
        if let Some(path) = output {
            labctl_store::write_atomic(path, merged.as_bytes())?;
            info!("wrote merged configuration to {}", path.display());
        }

        Ok(ConfigOutcome {
            extension: ext.name,
            fragments: invocation.fragment_labels(),
            project: invocation.project,
            env_files: invocation.env_files,
            output: output.map(Path::to_path_buf),
            merged,
        })
    }

    /// Interactive shell inside the running instance. The instance already
    /// carries its configuration, so `extras` are only checked to exist.
    pub fn enter(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
        shell: &str,
    ) -> Result<(), CoreError> {
        let ext = self.resolve(name)?;
        compose(&self.layout, &ext, None, extras)?;
        let container = ext.container_name();
        let state = self.runtime.status(&container)?;
        check_precondition(Command::Enter, &container, state)?;
        self.runtime.enter(&container, shell)?;
        Ok(())
    }

    /// Copy run artifacts to `destination` (default `<context>/artifacts`).
    pub fn copy(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
        destination: Option<&Path>,
    ) -> Result<CopyReport, CoreError> {
        let ext = self.resolve(name)?;
        let state = self.runtime.status(&ext.container_name())?;
        check_precondition(Command::Copy, &ext.container_name(), state)?;

        let invocation = compose(&self.layout, &ext, None, extras)?;
        let destination =
            destination.map_or_else(|| self.layout.artifacts_dir(), Path::to_path_buf);
        copy_artifacts(
            self.runtime.as_ref(),
            &ext,
            &invocation.lab_root(),
            &destination,
        )
    }

    /// Remove the instance. Named volumes are kept; the temporary X
    /// authority directory is removed while the X11 decision is kept.
    pub fn stop(
        &self,
        name: Option<&str>,
        extras: &ComposeExtras,
    ) -> Result<StopOutcome, CoreError> {
        let ext = self.resolve(name)?;
        let container = ext.container_name();
        let state = self.runtime.status(&container)?;
        check_precondition(Command::Stop, &container, state)?;

        let invocation = compose(&self.layout, &ext, None, extras)?;
        let materialized = invocation.materialize()?;
        info!("stopping {container}");
        self.runtime.down(&materialized.spec)?;

        let x11_cleaned = self.release_x11()?;
        Ok(StopOutcome {
            extension: ext.name,
            container,
            x11_cleaned,
        })
    }

    /// Settle the X11 decision for a start and carry out its side effects.
    /// Returns the forwarding to attach (if any) and whether `ask` was used.
    fn prepare_x11(
        &self,
        ask: impl FnOnce() -> bool,
    ) -> Result<(Option<X11Forwarding>, bool), CoreError> {
        let statefile = self.layout.state_file();
        let recorded = PersistedConfig::load(&statefile);
        let negotiated = negotiation_needed(&recorded);
        let enabled = if negotiated {
            let answer = ask();
            info!(
                "X11 forwarding {}",
                if answer { "enabled" } else { "disabled" }
            );
            answer
        } else {
            recorded.x11_enabled()
        };

        let forwarding = plan_x11(enabled, &recorded, &self.display.probe(), &statefile)
            .and_then(|plan| {
                let fwd = match (plan.xauth.as_ref(), plan.display.as_ref()) {
                    (Some(XauthStep::Reuse(dir)), Some(display)) => {
                        debug!("reusing X authority in {}", dir.display());
                        Some(X11Forwarding {
                            display: display.clone(),
                            tmp_dir: dir.clone(),
                        })
                    }
                    (Some(XauthStep::Synthesize), Some(display)) => {
                        Some(self.synthesize_xauth(display, &statefile)?)
                    }
                    _ => None,
                };
                let saved = plan
                    .persisted(fwd.as_ref().map(|f| f.tmp_dir.clone()))
                    .save(&statefile);
                if let Err(e) = saved {
                    // Nothing records a fresh directory once the save fails.
                    if let (Some(XauthStep::Synthesize), Some(f)) = (plan.xauth.as_ref(), &fwd) {
                        remove_xauth_dir(&f.tmp_dir);
                    }
                    return Err(e.into());
                }
                Ok(fwd)
            });

        match forwarding {
            Ok(fwd) => Ok((fwd, negotiated)),
            Err(e) => {
                // Keep a fresh "yes" so the remedy in the error applies.
                if negotiated && enabled {
                    let answered = PersistedConfig {
                        x11_forwarding: X11Preference::Enabled,
                        tmp_dir: None,
                    };
                    if let Err(save_err) = answered.save(&statefile) {
                        warn!("could not record X11 decision: {save_err}");
                    }
                }
                Err(e)
            }
        }
    }

    fn synthesize_xauth(&self, display: &str, statefile: &Path) -> Result<X11Forwarding, CoreError> {
        let tmp_dir = tempfile::Builder::new().prefix("labctl-x11-").tempdir()?.keep();
        if let Err(e) = self.display.write_xauth(display, &xauth_file(&tmp_dir)) {
            remove_xauth_dir(&tmp_dir);
            return Err(CoreError::MissingDisplayAuth {
                reason: e.to_string(),
                statefile: statefile.to_path_buf(),
            });
        }
        debug!("synthesized X authority in {}", tmp_dir.display());
        Ok(X11Forwarding {
            display: display.to_owned(),
            tmp_dir,
        })
    }

    /// Remove the temporary X authority directory, keeping the decision.
    fn release_x11(&self) -> Result<bool, CoreError> {
        let statefile = self.layout.state_file();
        let mut recorded = PersistedConfig::load(&statefile);
        let Some(tmp_dir) = recorded.tmp_dir.take() else {
            return Ok(false);
        };

        remove_xauth_dir(&tmp_dir);
        recorded.save(&statefile)?;
        Ok(true)
    }
}

fn remove_xauth_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("removed {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove {}: {e}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl_runtime::{MockDisplay, MockRuntime};
    use std::fs;
    use std::sync::Arc;

    fn engine(display: MockDisplay) -> (tempfile::TempDir, Arc<MockRuntime>, Engine) {
        let repo = tempfile::tempdir().unwrap();
        let root = repo.path().join("docker");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("docker-compose.yaml"), "services: {}\n").unwrap();
        fs::write(root.join(".env.base"), "ACCEPT_EULA=Y\n").unwrap();
        fs::write(root.join("x11.yaml"), "services: {}\n").unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let engine = Engine::new(
            ContextLayout::new(root),
            Box::new(Arc::clone(&runtime)),
            Box::new(display),
        )
        .unwrap();
        (repo, runtime, engine)
    }

    #[test]
    fn start_records_declined_x11() {
        let (_repo, runtime, engine) = engine(MockDisplay::headless());
        let out = engine.start(None, &ComposeExtras::default(), || false).unwrap();
        assert!(out.negotiated);
        assert_eq!(out.x11, X11Preference::Disabled);
        assert_eq!(runtime.calls(), ["build isaac-lab-base", "up isaac-lab-base"]);
        let saved = PersistedConfig::load(&engine.layout().state_file());
        assert_eq!(saved.x11_forwarding, X11Preference::Disabled);
    }

    #[test]
    fn failed_auth_keeps_the_answer() {
        let (_repo, runtime, engine) = engine(MockDisplay::headless());
        let err = engine
            .start(None, &ComposeExtras::default(), || true)
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingDisplayAuth { .. }));
        assert!(runtime.calls().is_empty());
        let saved = PersistedConfig::load(&engine.layout().state_file());
        assert_eq!(saved.x11_forwarding, X11Preference::Enabled);
    }

    #[test]
    fn failed_save_removes_fresh_xauth_dir() {
        let display = Arc::new(MockDisplay::with_display());
        let repo = tempfile::tempdir().unwrap();
        let root = repo.path().join("docker");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("docker-compose.yaml"), "services: {}\n").unwrap();
        fs::write(root.join(".env.base"), "ACCEPT_EULA=Y\n").unwrap();
        fs::write(root.join("x11.yaml"), "services: {}\n").unwrap();
        // A directory in place of the preference file makes every save fail.
        fs::create_dir_all(root.join(".container.cfg/occupied")).unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let engine = Engine::new(
            ContextLayout::new(root),
            Box::new(Arc::clone(&runtime)),
            Box::new(Arc::clone(&display)),
        )
        .unwrap();

        let err = engine.start(None, &ComposeExtras::default(), || true).unwrap_err();
        assert!(matches!(err, CoreError::Store(_)), "{err}");
        let writes = display.xauth_writes();
        assert_eq!(writes.len(), 1);
        assert!(!writes[0].parent().unwrap().exists());
        assert_eq!(runtime.count("up"), 0);
    }

    #[test]
    fn stop_releases_xauth_dir() {
        let (_repo, _runtime, engine) = engine(MockDisplay::with_display());
        engine.start(None, &ComposeExtras::default(), || true).unwrap();
        let saved = PersistedConfig::load(&engine.layout().state_file());
        let tmp_dir = saved.tmp_dir.clone().unwrap();
        assert!(xauth_file(&tmp_dir).is_file());

        let out = engine.stop(None, &ComposeExtras::default()).unwrap();
        assert!(out.x11_cleaned);
        assert!(!tmp_dir.exists());
        let after = PersistedConfig::load(&engine.layout().state_file());
        assert_eq!(after.x11_forwarding, X11Preference::Enabled);
        assert!(after.tmp_dir.is_none());
    }

    #[test]
    fn list_reports_every_extension() {
        let (_repo, runtime, engine) = engine(MockDisplay::headless());
        runtime.set_instance("isaac-lab-ros2", InstanceState::Stopped);
        let list = engine.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].state, InstanceState::Absent);
        assert_eq!(list[1].name, "ros2");
        assert_eq!(list[1].state, InstanceState::Stopped);
    }

    #[test]
    fn build_does_not_create_instance() {
        let (_repo, runtime, engine) = engine(MockDisplay::headless());
        let out = engine.build(None, &ComposeExtras::default()).unwrap();
        assert_eq!(out.image, "isaac-lab-base:latest");
        assert_eq!(runtime.status("isaac-lab-base").unwrap(), InstanceState::Absent);
        assert_eq!(runtime.count("build"), 1);
    }
}
