use std::path::{Path, PathBuf};

pub const DEFAULT_CONTEXT_DIR: &str = "docker";
pub const BASE_FRAGMENT: &str = "docker-compose.yaml";
pub const BASE_ENV_FILE: &str = ".env.base";
pub const X11_FRAGMENT: &str = "x11.yaml";
const DOCKERFILE: &str = "Dockerfile";
const STATE_FILE: &str = ".container.cfg";
const ARTIFACTS_DIR: &str = "artifacts";

/// Directory layout of a compose context.
///
/// The context holds the shared base fragment, per-extension fragments and env
/// files, the optional multi-stage `Dockerfile`, and the persisted preference
/// file. Nothing is created here; paths are only computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLayout {
    root: PathBuf,
}

impl ContextLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The repository checkout the context lives in. Host-side bind mount
    /// sources are relative to this directory.
    pub fn project_root(&self) -> PathBuf {
        self.root
            .parent()
            .map_or_else(|| self.root.join(".."), Path::to_path_buf)
    }

    #[inline]
    pub fn base_fragment(&self) -> PathBuf {
        self.root.join(BASE_FRAGMENT)
    }

    #[inline]
    pub fn base_env_file(&self) -> PathBuf {
        self.root.join(BASE_ENV_FILE)
    }

    #[inline]
    pub fn x11_fragment(&self) -> PathBuf {
        self.root.join(X11_FRAGMENT)
    }

    #[inline]
    pub fn dockerfile(&self) -> PathBuf {
        self.root.join(DOCKERFILE)
    }

    #[inline]
    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    #[inline]
    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    /// Fragment contributed by the stage `name`: `<name>.yaml`.
    pub fn stage_fragment(name: &str) -> PathBuf {
        PathBuf::from(format!("{name}.yaml"))
    }

    /// Env file contributed by the stage `name`: `.env.<name>`.
    pub fn stage_env_file(name: &str) -> PathBuf {
        PathBuf::from(format!(".env.{name}"))
    }

    /// Resolve a context-relative path. Absolute paths pass through.
    pub fn resolve(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}
