use crate::CoreError;
use labctl_runtime::{ContainerRuntime, InstanceState};
use labctl_schema::{lookup, Extension, Mount};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One directory copied back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArtifactItem {
    /// Subdirectory of the destination.
    pub dest: &'static str,
    /// Named volume holding the source.
    pub volume: &'static str,
}

pub const ARTIFACT_ITEMS: [ArtifactItem; 3] = [
    ArtifactItem {
        dest: "logs",
        volume: "isaac-lab-logs",
    },
    ArtifactItem {
        dest: "data_storage",
        volume: "isaac-lab-data",
    },
    ArtifactItem {
        dest: "docs_build",
        volume: "isaac-lab-docs",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyFailure {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub destination: PathBuf,
    pub copied: Vec<String>,
    pub failed: Vec<CopyFailure>,
}

impl CopyReport {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn clear_dir(path: &Path) -> Result<(), std::io::Error> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path)?,
        Ok(_) => std::fs::remove_file(path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(path)
}

/// Copy every artifact directory of `extension` into `destination`.
///
/// Each item's destination subdirectory is emptied first. Sources are read
/// from the instance while it exists (running or stopped), otherwise from the
/// named volume through a throwaway container of the extension image. A
/// failing item does not stop the others; it is recorded in the report.
pub fn copy_artifacts(
    runtime: &dyn ContainerRuntime,
    extension: &Extension,
    lab_root: &Path,
    destination: &Path,
) -> Result<CopyReport, CoreError> {
    std::fs::create_dir_all(destination)?;
    let container = extension.container_name();
    let image = extension.image_name();
    let state = runtime.status(&container)?;

    let mut report = CopyReport {
        destination: destination.to_path_buf(),
        ..CopyReport::default()
    };

    for item in ARTIFACT_ITEMS {
        let target = destination.join(item.dest);
        let result = clear_dir(&target)
            .map_err(labctl_runtime::RuntimeError::from)
            .and_then(|()| {
                let source = match lookup(item.volume) {
                    Some(Mount::Volume(v)) => v.container_path.resolve(lab_root),
                    _ => {
                        return Err(labctl_runtime::RuntimeError::SourceMissing(format!(
                            "no volume named '{}'",
                            item.volume
                        )))
                    }
                };
                if state == InstanceState::Absent {
                    runtime.copy_from_volume(item.volume, &source, &image, &target)
                } else {
                    runtime.copy_from_instance(&container, &source, &target)
                }
            });

        match result {
            Ok(()) => {
                info!("copied {} to {}", item.dest, target.display());
                report.copied.push(item.dest.to_owned());
            }
            Err(e) => {
                warn!("could not copy {}: {e}", item.dest);
                report.failed.push(CopyFailure {
                    item: item.dest.to_owned(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
