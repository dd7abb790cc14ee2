//! Static table of named volumes and host bind mounts.
//!
//! Named volumes are owned by the container runtime and outlive every
//! instance; they are declared here so the composer can attach them and the
//! artifact copier can find container-side sources. Bind mounts expose
//! editable host trees inside the instance.

use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumePurpose {
    Cache,
    Log,
    Data,
}

impl std::fmt::Display for VolumePurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumePurpose::Cache => write!(f, "cache"),
            VolumePurpose::Log => write!(f, "log"),
            VolumePurpose::Data => write!(f, "data"),
        }
    }
}

/// Where a mount lands inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerPath {
    Absolute(&'static str),
    /// Relative to the lab root (`DOCKER_ISAACLAB_PATH`).
    LabRelative(&'static str),
}

impl ContainerPath {
    pub fn resolve(&self, lab_root: &Path) -> PathBuf {
        match self {
            ContainerPath::Absolute(p) => PathBuf::from(p),
            ContainerPath::LabRelative(p) => lab_root.join(p),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub name: &'static str,
    pub container_path: ContainerPath,
    pub purpose: VolumePurpose,
}

/// A declared host tree, relative to the project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BindMountDecl {
    pub name: &'static str,
    pub host_path: &'static str,
    pub container_path: ContainerPath,
    pub read_only: bool,
}

impl BindMountDecl {
    pub fn resolve(&self, project_root: &Path, lab_root: &Path) -> BindMount {
        BindMount {
            source: project_root.join(self.host_path),
            target: self.container_path.resolve(lab_root),
            read_only: self.read_only,
        }
    }
}

/// A bind mount with concrete host and container paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: PathBuf,
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mount {
    Volume(&'static Volume),
    Bind(&'static BindMountDecl),
}

const VOLUMES: &[Volume] = &[
    Volume {
        name: "isaac-cache-kit",
        container_path: ContainerPath::Absolute("/isaac-sim/kit/cache"),
        purpose: VolumePurpose::Cache,
    },
    Volume {
        name: "isaac-cache-ov",
        container_path: ContainerPath::Absolute("/root/.cache/ov"),
        purpose: VolumePurpose::Cache,
    },
    Volume {
        name: "isaac-cache-pip",
        container_path: ContainerPath::Absolute("/root/.cache/pip"),
        purpose: VolumePurpose::Cache,
    },
    Volume {
        name: "isaac-cache-gl",
        container_path: ContainerPath::Absolute("/root/.cache/nvidia/GLCache"),
        purpose: VolumePurpose::Cache,
    },
    Volume {
        name: "isaac-cache-compute",
        container_path: ContainerPath::Absolute("/root/.nv/ComputeCache"),
        purpose: VolumePurpose::Cache,
    },
    Volume {
        name: "isaac-logs",
        container_path: ContainerPath::Absolute("/root/.nvidia-omniverse/logs"),
        purpose: VolumePurpose::Log,
    },
    Volume {
        name: "isaac-carb-logs",
        container_path: ContainerPath::Absolute("/isaac-sim/kit/logs/Kit/Isaac-Sim"),
        purpose: VolumePurpose::Log,
    },
    Volume {
        name: "isaac-data",
        container_path: ContainerPath::Absolute("/root/.local/share/ov/data"),
        purpose: VolumePurpose::Data,
    },
    Volume {
        name: "isaac-docs",
        container_path: ContainerPath::Absolute("/root/Documents"),
        purpose: VolumePurpose::Data,
    },
    Volume {
        name: "isaac-lab-docs",
        container_path: ContainerPath::LabRelative("docs/_build"),
        purpose: VolumePurpose::Data,
    },
    Volume {
        name: "isaac-lab-logs",
        container_path: ContainerPath::LabRelative("logs"),
        purpose: VolumePurpose::Log,
    },
    Volume {
        name: "isaac-lab-data",
        container_path: ContainerPath::LabRelative("data_storage"),
        purpose: VolumePurpose::Data,
    },
];

const BIND_MOUNTS: &[BindMountDecl] = &[
    BindMountDecl {
        name: "source",
        host_path: "source",
        container_path: ContainerPath::LabRelative("source"),
        read_only: false,
    },
    BindMountDecl {
        name: "docs",
        host_path: "docs",
        container_path: ContainerPath::LabRelative("docs"),
        read_only: false,
    },
    BindMountDecl {
        name: "tools",
        host_path: "tools",
        container_path: ContainerPath::LabRelative("tools"),
        read_only: false,
    },
];

pub fn all_volumes() -> &'static [Volume] {
    VOLUMES
}

pub fn all_bind_mounts() -> &'static [BindMountDecl] {
    BIND_MOUNTS
}

pub fn lookup(name: &str) -> Option<Mount> {
    VOLUMES
        .iter()
        .find(|v| v.name == name)
        .map(Mount::Volume)
        .or_else(|| BIND_MOUNTS.iter().find(|b| b.name == name).map(Mount::Bind))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_globally_unique() {
        let mut names: Vec<&str> = VOLUMES
            .iter()
            .map(|v| v.name)
            .chain(BIND_MOUNTS.iter().map(|b| b.name))
            .collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn lookup_finds_volume_and_bind() {
        assert!(matches!(lookup("isaac-lab-logs"), Some(Mount::Volume(v)) if v.purpose == VolumePurpose::Log));
        assert!(matches!(lookup("source"), Some(Mount::Bind(b)) if !b.read_only));
        assert!(lookup("nonexistent").is_none());
    }

    #[test]
    fn lab_relative_paths_follow_root() {
        let Some(Mount::Volume(v)) = lookup("isaac-lab-docs") else {
            panic!("isaac-lab-docs must be a volume");
        };
        assert_eq!(
            v.container_path.resolve(Path::new("/workspace/isaaclab")),
            PathBuf::from("/workspace/isaaclab/docs/_build")
        );
    }

    #[test]
    fn bind_mount_resolution() {
        let Some(Mount::Bind(b)) = lookup("source") else {
            panic!("source must be a bind mount");
        };
        let mount = b.resolve(Path::new("/repo"), Path::new("/workspace/isaaclab"));
        assert_eq!(mount.source, PathBuf::from("/repo/source"));
        assert_eq!(mount.target, PathBuf::from("/workspace/isaaclab/source"));
    }

    #[test]
    fn every_purpose_is_declared() {
        for purpose in [VolumePurpose::Cache, VolumePurpose::Log, VolumePurpose::Data] {
            assert!(all_volumes().iter().any(|v| v.purpose == purpose));
        }
    }
}
