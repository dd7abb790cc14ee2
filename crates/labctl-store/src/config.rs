use crate::{write_atomic, StoreError};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const KEY_X11: &str = "x11_forwarding_enabled";
const KEY_TMP_DIR: &str = "x11_tmp_dir";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum X11Preference {
    /// No decision recorded yet; `start` must negotiate.
    #[default]
    Unset,
    Enabled,
    Disabled,
}

impl std::fmt::Display for X11Preference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            X11Preference::Unset => write!(f, "unset"),
            X11Preference::Enabled => write!(f, "enabled"),
            X11Preference::Disabled => write!(f, "disabled"),
        }
    }
}

/// Process-wide preferences loaded once per invocation and passed by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistedConfig {
    pub x11_forwarding: X11Preference,
    /// Invocation-scoped directory holding the synthesized `.xauth` file.
    pub tmp_dir: Option<PathBuf>,
}

impl PersistedConfig {
    #[inline]
    pub fn x11_enabled(&self) -> bool {
        self.x11_forwarding == X11Preference::Enabled
    }

    /// Load the preference file. A missing or unreadable file yields the
    /// default (unset) config, which tells the caller to negotiate again.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(path, &content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("ignoring unreadable preference file: {e}");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preference file at {}", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("cannot read preference file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    fn parse(path: &Path, content: &str) -> Result<Self, StoreError> {
        let mut cfg = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                KEY_X11 => {
                    cfg.x11_forwarding = match value {
                        "1" => X11Preference::Enabled,
                        "0" => X11Preference::Disabled,
                        "" => X11Preference::Unset,
                        other => {
                            return Err(StoreError::InvalidValue {
                                path: path.display().to_string(),
                                key: key.to_owned(),
                                value: other.to_owned(),
                            })
                        }
                    };
                }
                KEY_TMP_DIR if !value.is_empty() => cfg.tmp_dir = Some(PathBuf::from(value)),
                _ => {}
            }
        }
        Ok(cfg)
    }

    fn render(&self) -> String {
        let mut out = String::from("# labctl preferences; delete this file to renegotiate\n");
        let flag = match self.x11_forwarding {
            X11Preference::Enabled => "1",
            X11Preference::Disabled => "0",
            X11Preference::Unset => "",
        };
        let _ = writeln!(out, "{KEY_X11}={flag}");
        if let Some(dir) = &self.tmp_dir {
            let _ = writeln!(out, "{KEY_TMP_DIR}={}", dir.display());
        }
        out
    }

    /// Write atomically: temp file in the same directory, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_atomic(path, self.render().as_bytes())?;
        debug!("saved preferences to {}", path.display());
        Ok(())
    }
}
