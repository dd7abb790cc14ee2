//! Declarative inputs for labctl: where compose material lives and what it means.
//!
//! This crate defines the schema layer: the context directory layout
//! (`ContextLayout`), the extension registry and resolver (`ExtensionRegistry`),
//! Dockerfile stage discovery for user-defined templates, the static
//! volume/bind-mount table (`volumes`), and layered env-file loading.

pub mod dockerfile;
pub mod envfile;
pub mod extension;
pub mod layout;
pub mod volumes;

pub use dockerfile::{parse_stages, stage_chains, Stage};
pub use envfile::{load_dot_vars, lab_root, DEFAULT_LAB_ROOT};
pub use extension::{
    container_name, image_name, validate_extension_name, Extension, ExtensionRegistry,
    BASE_EXTENSION,
};
pub use layout::ContextLayout;
pub use volumes::{
    all_bind_mounts, all_volumes, lookup, BindMount, BindMountDecl, ContainerPath, Mount, Volume,
    VolumePurpose,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown extension '{name}' (known: {})", known.join(", "))]
    UnknownExtension { name: String, known: Vec<String> },
    #[error("invalid extension name '{0}': must be 1-64 characters of [a-z0-9_-]")]
    InvalidExtensionName(String),
    #[error("failed to parse env file {}: {message}", path.display())]
    EnvFile { path: PathBuf, message: String },
}
