//! X11 forwarding decisions.
//!
//! Everything here is a decision over values: the persisted preference, the
//! user's answer, and a probe of the host display. Creating temp directories,
//! writing X authority files, and saving the preference happen in the engine.

use crate::CoreError;
use labctl_runtime::{xauth_file, DisplayProbe, X11_SOCKET_DIR};
use labctl_schema::BindMount;
use labctl_store::{PersistedConfig, X11Preference};
use std::path::{Path, PathBuf};

/// Env var the X11 fragment reads the host-side authority file from.
pub const XAUTH_ENV: &str = "__ISAACLAB_TMP_XAUTH";
/// Where the authority file appears inside the container.
pub const CONTAINER_XAUTH: &str = "/tmp/.docker.xauth";

/// True iff no decision has been recorded yet.
#[inline]
pub fn negotiation_needed(config: &PersistedConfig) -> bool {
    config.x11_forwarding == X11Preference::Unset
}

/// How the X authority file for this start is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XauthStep {
    /// A previous start left a usable `.xauth` in this directory.
    Reuse(PathBuf),
    /// Create a fresh directory and extract credentials with `xauth`.
    Synthesize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Plan {
    pub preference: X11Preference,
    pub display: Option<String>,
    pub xauth: Option<XauthStep>,
}

impl X11Plan {
    fn disabled() -> Self {
        Self {
            preference: X11Preference::Disabled,
            display: None,
            xauth: None,
        }
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.preference == X11Preference::Enabled
    }

    /// The preference record to save once the plan has been carried out.
    pub fn persisted(&self, tmp_dir: Option<PathBuf>) -> PersistedConfig {
        PersistedConfig {
            x11_forwarding: self.preference,
            tmp_dir: if self.enabled() { tmp_dir } else { None },
        }
    }
}

/// Forwarding that is ready to be attached to a compose invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X11Forwarding {
    pub display: String,
    pub tmp_dir: PathBuf,
}

impl X11Forwarding {
    pub fn xauth_path(&self) -> PathBuf {
        xauth_file(&self.tmp_dir)
    }

    pub fn bind_mount(&self) -> BindMount {
        BindMount {
            source: self.xauth_path(),
            target: PathBuf::from(CONTAINER_XAUTH),
            read_only: true,
        }
    }

    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (
                XAUTH_ENV.to_owned(),
                self.xauth_path().to_string_lossy().into_owned(),
            ),
            ("DISPLAY".to_owned(), self.display.clone()),
        ]
    }
}

/// Decide what forwarding needs for this start.
///
/// `enabled` is either the fresh answer or the recorded preference. When
/// forwarding is on but the host cannot provide display authorization the
/// error names `statefile`, since deleting it is how the user changes their
/// mind.
pub fn plan_x11(
    enabled: bool,
    config: &PersistedConfig,
    probe: &DisplayProbe,
    statefile: &Path,
) -> Result<X11Plan, CoreError> {
    if !enabled {
        return Ok(X11Plan::disabled());
    }

    let missing = |reason: String| CoreError::MissingDisplayAuth {
        reason,
        statefile: statefile.to_path_buf(),
    };

    let display = probe
        .display
        .clone()
        .ok_or_else(|| missing("DISPLAY is not set".to_owned()))?;
    if !probe.socket_dir_present {
        return Err(missing(format!("{X11_SOCKET_DIR} does not exist")));
    }

    let reusable = config
        .tmp_dir
        .as_ref()
        .filter(|dir| xauth_file(dir).is_file());
    let xauth = match reusable {
        Some(dir) => XauthStep::Reuse(dir.clone()),
        None if probe.xauth_available => XauthStep::Synthesize,
        None => return Err(missing("the xauth program is not installed".to_owned())),
    };

    Ok(X11Plan {
        preference: X11Preference::Enabled,
        display: Some(display),
        xauth: Some(xauth),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> DisplayProbe {
        DisplayProbe {
            display: Some(":1".to_owned()),
            socket_dir_present: true,
            xauth_available: true,
        }
    }

    const STATEFILE: &str = "/repo/docker/.container.cfg";

    #[test]
    fn only_unset_needs_negotiation() {
        let mut cfg = PersistedConfig::default();
        assert!(negotiation_needed(&cfg));
        cfg.x11_forwarding = X11Preference::Disabled;
        assert!(!negotiation_needed(&cfg));
        cfg.x11_forwarding = X11Preference::Enabled;
        assert!(!negotiation_needed(&cfg));
    }

    #[test]
    fn disabled_plan_touches_nothing() {
        let plan = plan_x11(
            false,
            &PersistedConfig::default(),
            &DisplayProbe::default(),
            Path::new(STATEFILE),
        )
        .unwrap();
        assert!(!plan.enabled());
        assert!(plan.xauth.is_none());
        let saved = plan.persisted(Some(PathBuf::from("/tmp/x")));
        assert_eq!(saved.x11_forwarding, X11Preference::Disabled);
        assert!(saved.tmp_dir.is_none());
    }

    #[test]
    fn enabled_without_display_fails_with_remedy() {
        let mut p = probe();
        p.display = None;
        let err = plan_x11(true, &PersistedConfig::default(), &p, Path::new(STATEFILE))
            .unwrap_err();
        match err {
            CoreError::MissingDisplayAuth { reason, statefile } => {
                assert!(reason.contains("DISPLAY"));
                assert_eq!(statefile, PathBuf::from(STATEFILE));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn enabled_without_socket_dir_fails() {
        let mut p = probe();
        p.socket_dir_present = false;
        let err = plan_x11(true, &PersistedConfig::default(), &p, Path::new(STATEFILE))
            .unwrap_err();
        assert!(err.to_string().contains(X11_SOCKET_DIR));
    }

    #[test]
    fn fresh_plan_synthesizes() {
        let plan =
            plan_x11(true, &PersistedConfig::default(), &probe(), Path::new(STATEFILE)).unwrap();
        assert!(plan.enabled());
        assert_eq!(plan.display.as_deref(), Some(":1"));
        assert_eq!(plan.xauth, Some(XauthStep::Synthesize));
    }

    #[test]
    fn stored_xauth_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(xauth_file(dir.path()), "cookie").unwrap();
        let cfg = PersistedConfig {
            x11_forwarding: X11Preference::Enabled,
            tmp_dir: Some(dir.path().to_path_buf()),
        };
        let plan = plan_x11(true, &cfg, &probe(), Path::new(STATEFILE)).unwrap();
        assert_eq!(plan.xauth, Some(XauthStep::Reuse(dir.path().to_path_buf())));
    }

    #[test]
    fn stale_tmp_dir_is_replaced() {
        let cfg = PersistedConfig {
            x11_forwarding: X11Preference::Enabled,
            tmp_dir: Some(PathBuf::from("/nonexistent/labctl-x11")),
        };
        let plan = plan_x11(true, &cfg, &probe(), Path::new(STATEFILE)).unwrap();
        assert_eq!(plan.xauth, Some(XauthStep::Synthesize));
    }

    #[test]
    fn synthesis_needs_xauth() {
        let mut p = probe();
        p.xauth_available = false;
        assert!(matches!(
            plan_x11(true, &PersistedConfig::default(), &p, Path::new(STATEFILE)),
            Err(CoreError::MissingDisplayAuth { .. })
        ));
    }

    #[test]
    fn forwarding_mount_is_read_only() {
        let fwd = X11Forwarding {
            display: ":1".to_owned(),
            tmp_dir: PathBuf::from("/tmp/labctl-x11-abc"),
        };
        let mount = fwd.bind_mount();
        assert!(mount.read_only);
        assert_eq!(mount.source, PathBuf::from("/tmp/labctl-x11-abc/.xauth"));
        assert_eq!(mount.target, PathBuf::from(CONTAINER_XAUTH));
        assert_eq!(
            fwd.env(),
            [
                (XAUTH_ENV.to_owned(), "/tmp/labctl-x11-abc/.xauth".to_owned()),
                ("DISPLAY".to_owned(), ":1".to_owned()),
            ]
        );
    }
}
