use crate::RuntimeError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Host directory holding the X server sockets.
pub const X11_SOCKET_DIR: &str = "/tmp/.X11-unix";

/// Snapshot of the host display session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayProbe {
    /// Value of `DISPLAY`, if set and non-empty.
    pub display: Option<String>,
    pub socket_dir_present: bool,
    pub xauth_available: bool,
}

/// Host-side X11 effects, behind a trait so negotiation can be tested.
pub trait DisplayHost: Send + Sync {
    fn probe(&self) -> DisplayProbe;

    /// Create an X authority file at `dest` granting access to `display`
    /// from any host name, so it is valid inside the container.
    fn write_xauth(&self, display: &str, dest: &Path) -> Result<(), RuntimeError>;
}

impl<D: DisplayHost + ?Sized> DisplayHost for std::sync::Arc<D> {
    fn probe(&self) -> DisplayProbe {
        (**self).probe()
    }

    fn write_xauth(&self, display: &str, dest: &Path) -> Result<(), RuntimeError> {
        (**self).write_xauth(display, dest)
    }
}

#[derive(Debug, Default)]
pub struct SystemDisplay;

impl SystemDisplay {
    pub fn new() -> Self {
        Self
    }
}

impl DisplayHost for SystemDisplay {
    fn probe(&self) -> DisplayProbe {
        DisplayProbe {
            display: std::env::var("DISPLAY").ok().filter(|d| !d.is_empty()),
            socket_dir_present: Path::new(X11_SOCKET_DIR).is_dir(),
            xauth_available: which::which("xauth").is_ok(),
        }
    }

    fn write_xauth(&self, display: &str, dest: &Path) -> Result<(), RuntimeError> {
        let listing = Command::new("xauth")
            .args(["nlist", display])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| RuntimeError::DisplayUnavailable(format!("cannot run xauth: {e}")))?;
        if !listing.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("xauth nlist {display}"),
                status: listing.status.to_string(),
                stderr: String::from_utf8_lossy(&listing.stderr).into_owned(),
            });
        }
        let cookies = wildcard_family(&String::from_utf8_lossy(&listing.stdout));

        // xauth refuses to merge into a file that does not exist yet.
        std::fs::File::create(dest)?;

        let mut merge = Command::new("xauth")
            .arg("-f")
            .arg(dest)
            .args(["nmerge", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = merge.stdin.take() {
            stdin.write_all(cookies.as_bytes())?;
        }
        let output = merge.wait_with_output()?;
        if !output.status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("xauth -f {} nmerge -", dest.display()),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let display_name = display;
        debug!("wrote X authority for {display_name} to {}", dest.display());
        Ok(())
    }
}

/// Rewrite the address family of every `xauth nlist` entry to FamilyWild
/// (`ffff`), so the cookie matches whatever host name the container uses.
pub fn wildcard_family(nlist: &str) -> String {
    let mut out = String::with_capacity(nlist.len());
    for line in nlist.lines().filter(|l| l.len() >= 4) {
        out.push_str("ffff");
        out.push_str(&line[4..]);
        out.push('\n');
    }
    out
}

/// Path of the X authority file inside an invocation temp directory.
pub fn xauth_file(tmp_dir: &Path) -> PathBuf {
    tmp_dir.join(".xauth")
}
