use crate::dockerfile::{parse_stages, stage_chains};
use crate::layout::ContextLayout;
use crate::SchemaError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const BASE_EXTENSION: &str = "base";
const ROS2_EXTENSION: &str = "ros2";

/// Accepted spelling of the base extension that is not a real stage.
const BASE_ALIAS: &str = "isaaclab";

/// A named build/runtime variant and the compose material it adds on top of
/// the shared base fragment and env file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub name: String,
    /// Dockerfile stage the image is built from.
    pub stage: String,
    /// Extension fragments, context-relative, in override order.
    pub fragments: Vec<PathBuf>,
    /// Extension env files, context-relative, in override order.
    pub env_files: Vec<PathBuf>,
}

impl Extension {
    fn builtin_base() -> Self {
        Self {
            name: BASE_EXTENSION.to_owned(),
            stage: BASE_EXTENSION.to_owned(),
            fragments: Vec::new(),
            env_files: Vec::new(),
        }
    }

    fn builtin_ros2() -> Self {
        Self {
            name: ROS2_EXTENSION.to_owned(),
            stage: ROS2_EXTENSION.to_owned(),
            fragments: vec![ContextLayout::stage_fragment(ROS2_EXTENSION)],
            env_files: vec![ContextLayout::stage_env_file(ROS2_EXTENSION)],
        }
    }

    #[inline]
    pub fn container_name(&self) -> String {
        container_name(&self.name)
    }

    #[inline]
    pub fn image_name(&self) -> String {
        image_name(&self.name)
    }
}

/// Instance name for an extension. Distinct extensions never collide.
pub fn container_name(extension: &str) -> String {
    format!("isaac-lab-{extension}")
}

pub fn image_name(extension: &str) -> String {
    format!("isaac-lab-{extension}:latest")
}

pub fn validate_extension_name(name: &str) -> Result<(), SchemaError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidExtensionName(name.to_owned()))
    }
}

/// The set of extensions available in a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistry {
    extensions: BTreeMap<String, Extension>,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ExtensionRegistry {
    /// Only the built-in extensions (`base`, `ros2`).
    pub fn builtin() -> Self {
        let mut extensions = BTreeMap::new();
        for ext in [Extension::builtin_base(), Extension::builtin_ros2()] {
            extensions.insert(ext.name.clone(), ext);
        }
        Self { extensions }
    }

    /// Built-ins plus user-defined templates found in the context `Dockerfile`.
    ///
    /// A named stage becomes an extension when `<stage>.yaml` exists next to
    /// the Dockerfile. Its fragments and env files follow the stage's
    /// dependency chain, skipping `base` and any file that is not present.
    pub fn discover(layout: &ContextLayout) -> Result<Self, SchemaError> {
        let mut registry = Self::builtin();
        let dockerfile = layout.dockerfile();
        if !dockerfile.is_file() {
            debug!("no Dockerfile at {}, using built-in extensions", dockerfile.display());
            return Ok(registry);
        }

        let content = std::fs::read_to_string(&dockerfile)?;
        let stages = parse_stages(&content);
        let chains = stage_chains(&stages);

        for stage in &stages {
            let name = stage.name.as_str();
            if registry.extensions.contains_key(name) || name == BASE_ALIAS {
                continue;
            }
            if !layout.resolve(&ContextLayout::stage_fragment(name)).is_file() {
                continue;
            }
            if let Err(e) = validate_extension_name(name) {
                warn!("skipping Dockerfile stage: {e}");
                continue;
            }

            let chain = chains.get(name).map(Vec::as_slice).unwrap_or_default();
            let mut fragments = Vec::new();
            let mut env_files = Vec::new();
            for link in chain.iter().filter(|s| s.as_str() != BASE_EXTENSION) {
                let fragment = ContextLayout::stage_fragment(link);
                if layout.resolve(&fragment).is_file() {
                    fragments.push(fragment);
                }
                let env_file = ContextLayout::stage_env_file(link);
                if layout.resolve(&env_file).is_file() {
                    env_files.push(env_file);
                }
            }

            debug!("discovered extension '{name}' with chain {chain:?}");
            registry.extensions.insert(
                name.to_owned(),
                Extension {
                    name: name.to_owned(),
                    stage: name.to_owned(),
                    fragments,
                    env_files,
                },
            );
        }

        Ok(registry)
    }

    /// Look up an extension by name. `None` selects `base`.
    pub fn resolve(&self, name: Option<&str>) -> Result<Extension, SchemaError> {
        let requested = match name {
            None | Some(BASE_ALIAS) => BASE_EXTENSION,
            Some(n) => n,
        };
        self.extensions
            .get(requested)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownExtension {
                name: requested.to_owned(),
                known: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.values()
    }
}
