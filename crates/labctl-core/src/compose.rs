//! Ordered compose fragments and their last-wins merge.
//!
//! Fragment order for an extension is fixed: the shared base fragment, the
//! generated volume fragment, the extension's own fragments, the X11 fragment
//! when forwarding is on, then caller-supplied extras. Env files follow the
//! same shape. `merge_documents` is the override law the ordered list means;
//! `config` renders it without involving the container runtime.

use crate::negotiate::X11Forwarding;
use crate::CoreError;
use labctl_runtime::ComposeSpec;
use labctl_schema::{
    all_bind_mounts, all_volumes, lab_root, load_dot_vars, BindMount, ContextLayout, Extension,
};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Name of the generated volume fragment.
const VOLUMES_FRAGMENT: &str = "volumes";

/// Keys whose list form (`KEY=VALUE`) is normalized to a map before merging.
const KEYED_LISTS: &[&str] = &["environment", "labels"];
const MOUNT_LISTS: &[&str] = &["volumes", "devices"];
const APPENDED_LISTS: &[&str] = &[
    "ports",
    "expose",
    "cap_add",
    "cap_drop",
    "security_opt",
    "extra_hosts",
    "dns",
    "env_file",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    File(PathBuf),
    /// Generated at composition time; written to disk only when a runtime
    /// needs a file.
    Inline { name: String, document: Value },
}

impl Fragment {
    pub fn label(&self) -> String {
        match self {
            Fragment::File(path) => path.display().to_string(),
            Fragment::Inline { name, .. } => format!("<generated:{name}>"),
        }
    }

    fn document(&self) -> Result<Value, CoreError> {
        match self {
            Fragment::File(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        CoreError::MissingFragment(path.clone())
                    } else {
                        CoreError::Io(e)
                    }
                })?;
                if content.trim().is_empty() {
                    return Ok(Value::Null);
                }
                Ok(serde_yaml::from_str(&content)?)
            }
            Fragment::Inline { document, .. } => Ok(document.clone()),
        }
    }
}

/// Caller-supplied fragments and env files, appended after the built-ins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeExtras {
    pub fragments: Vec<PathBuf>,
    pub env_files: Vec<PathBuf>,
}

/// A fully resolved compose call. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeInvocation {
    pub project: String,
    pub context: PathBuf,
    pub fragments: Vec<Fragment>,
    pub env_files: Vec<PathBuf>,
    pub env: Vec<(String, String)>,
    pub volumes: Vec<String>,
    /// Layered env vars, used to locate container-side paths.
    pub vars: BTreeMap<String, String>,
}

impl ComposeInvocation {
    pub fn fragment_labels(&self) -> Vec<String> {
        self.fragments.iter().map(Fragment::label).collect()
    }

    pub fn lab_root(&self) -> PathBuf {
        lab_root(&self.vars)
    }

    /// Write inline fragments to a private temp dir and hand back a spec the
    /// runtime can execute. The directory lives as long as the result.
    pub fn materialize(&self) -> Result<Materialized, CoreError> {
        let dir = tempfile::Builder::new().prefix("labctl-compose-").tempdir()?;
        let mut files = Vec::with_capacity(self.fragments.len());
        for fragment in &self.fragments {
            match fragment {
                Fragment::File(path) => files.push(path.clone()),
                Fragment::Inline { name, document } => {
                    let path = dir.path().join(format!("{name}.yaml"));
                    std::fs::write(&path, serde_yaml::to_string(document)?)?;
                    debug!("wrote generated fragment {}", path.display());
                    files.push(path);
                }
            }
        }

        Ok(Materialized {
            spec: ComposeSpec {
                project: self.project.clone(),
                workdir: self.context.clone(),
                files,
                env_files: self.env_files.clone(),
                env: self.env.clone(),
                volumes: self.volumes.clone(),
            },
            _dir: dir,
        })
    }
}

/// A compose spec whose generated fragments exist on disk.
#[derive(Debug)]
pub struct Materialized {
    pub spec: ComposeSpec,
    _dir: TempDir,
}

/// Resolve the ordered fragment and env-file lists for `extension`.
///
/// Every file must exist; the first missing one is reported before anything
/// else happens. Relative extras are taken as given, so callers resolve them
/// against their working directory first.
pub fn compose(
    layout: &ContextLayout,
    extension: &Extension,
    x11: Option<&X11Forwarding>,
    extras: &ComposeExtras,
) -> Result<ComposeInvocation, CoreError> {
    let mut env_files = vec![layout.base_env_file()];
    env_files.extend(extension.env_files.iter().map(|p| layout.resolve(p)));
    env_files.extend(extras.env_files.iter().cloned());

    let mut files = vec![layout.base_fragment()];
    files.extend(extension.fragments.iter().map(|p| layout.resolve(p)));
    if x11.is_some() {
        files.push(layout.x11_fragment());
    }
    files.extend(extras.fragments.iter().cloned());

    if let Some(missing) = files.iter().chain(&env_files).find(|p| !p.is_file()) {
        return Err(CoreError::MissingFragment(missing.clone()));
    }

    let vars = load_dot_vars(&env_files)?;
    let container = extension.container_name();
    let extra_binds: Vec<BindMount> = x11.map(X11Forwarding::bind_mount).into_iter().collect();
    let generated = volumes_fragment(&container, layout, &lab_root(&vars), &extra_binds)?;

    let mut fragments: Vec<Fragment> = files.into_iter().map(Fragment::File).collect();
    fragments.insert(
        1,
        Fragment::Inline {
            name: VOLUMES_FRAGMENT.to_owned(),
            document: generated,
        },
    );

    let mut env = vec![("TARGET".to_owned(), extension.name.clone())];
    if let Some(fwd) = x11 {
        env.extend(fwd.env());
    }

    let invocation = ComposeInvocation {
        project: container,
        context: layout.root().to_path_buf(),
        fragments,
        env_files,
        env,
        volumes: all_volumes().iter().map(|v| v.name.to_owned()).collect(),
        vars,
    };
    debug!(
        "composed {} fragments for '{}': {:?}",
        invocation.fragments.len(),
        extension.name,
        invocation.fragment_labels()
    );
    Ok(invocation)
}

#[derive(Serialize)]
struct MountEntry {
    #[serde(rename = "type")]
    kind: &'static str,
    source: String,
    target: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    read_only: bool,
}

#[derive(Serialize)]
struct ServiceMounts {
    volumes: Vec<MountEntry>,
}

#[derive(Serialize)]
struct VolumeDecl {
    name: String,
}

#[derive(Serialize)]
struct VolumesDocument {
    services: BTreeMap<String, ServiceMounts>,
    volumes: BTreeMap<String, VolumeDecl>,
}

/// The generated fragment attaching every registry mount to `service`.
///
/// Named volumes carry an explicit `name:` so compose does not prefix them
/// with the project name; every extension sees the same caches and data.
pub fn volumes_fragment(
    service: &str,
    layout: &ContextLayout,
    lab_root: &Path,
    extra_binds: &[BindMount],
) -> Result<Value, CoreError> {
    let project_root = layout.project_root();
    let mut mounts = Vec::new();
    let mut declared = BTreeMap::new();

    for volume in all_volumes() {
        mounts.push(MountEntry {
            kind: "volume",
            source: volume.name.to_owned(),
            target: volume
                .container_path
                .resolve(lab_root)
                .to_string_lossy()
                .into_owned(),
            read_only: false,
        });
        declared.insert(
            volume.name.to_owned(),
            VolumeDecl {
                name: volume.name.to_owned(),
            },
        );
    }

    let binds = all_bind_mounts()
        .iter()
        .map(|decl| decl.resolve(&project_root, lab_root))
        .chain(extra_binds.iter().cloned());
    for bind in binds {
        mounts.push(MountEntry {
            kind: "bind",
            source: bind.source.to_string_lossy().into_owned(),
            target: bind.target.to_string_lossy().into_owned(),
            read_only: bind.read_only,
        });
    }

    let mut services = BTreeMap::new();
    services.insert(service.to_owned(), ServiceMounts { volumes: mounts });
    Ok(serde_yaml::to_value(VolumesDocument {
        services,
        volumes: declared,
    })?)
}

/// Merge documents in order. Mappings merge recursively and the later value
/// wins on a shared key. Mount lists (`volumes`, `devices`) merge by
/// container target, later entry winning; the lists in `APPENDED_LISTS` are
/// appended without duplicates. Any other sequence or scalar is replaced.
pub fn merge_documents(documents: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Mapping(Mapping::new());
    for document in documents {
        if document.is_null() {
            continue;
        }
        merge_into(&mut merged, normalize(document), None);
    }
    merged
}

fn merge_into(base: &mut Value, overlay: Value, key: Option<&str>) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_into(existing, value, key.as_str()),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Sequence(base), Value::Sequence(overlay))
            if key.is_some_and(|k| MOUNT_LISTS.contains(&k)) =>
        {
            merge_mounts(base, overlay);
        }
        (Value::Sequence(base), Value::Sequence(overlay))
            if key.is_some_and(|k| APPENDED_LISTS.contains(&k)) =>
        {
            for item in overlay {
                if !base.contains(&item) {
                    base.push(item);
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

fn merge_mounts(base: &mut Vec<Value>, overlay: Vec<Value>) {
    for item in overlay {
        let slot = mount_target(&item).and_then(|target| {
            base.iter()
                .position(|existing| mount_target(existing).as_deref() == Some(target.as_str()))
        });
        match slot {
            Some(i) => base[i] = item,
            None if base.contains(&item) => {}
            None => base.push(item),
        }
    }
}

/// Container-side path of a mount entry, long (`target:`) or short
/// (`src:dst[:mode]`, or a bare anonymous-volume path) form.
fn mount_target(entry: &Value) -> Option<String> {
    match entry {
        Value::Mapping(map) => map.get("target").and_then(Value::as_str).map(str::to_owned),
        Value::String(short) => {
            let mut parts = short.split(':');
            let first = parts.next()?;
            Some(parts.next().unwrap_or(first).to_owned())
        }
        _ => None,
    }
}

/// Rewrite `environment: [K=V]` and `labels: [K=V]` as maps, at any depth.
fn normalize(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let keyed = key.as_str().is_some_and(|k| KEYED_LISTS.contains(&k));
                    let value = match value {
                        Value::Sequence(items) if keyed => list_to_map(items),
                        other => normalize(other),
                    };
                    (key, value)
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn list_to_map(items: Vec<Value>) -> Value {
    if !items.iter().all(Value::is_string) {
        return Value::Sequence(items);
    }
    let mut map = Mapping::new();
    for item in items {
        let Value::String(entry) = item else { continue };
        match entry.split_once('=') {
            Some((k, v)) => map.insert(Value::String(k.to_owned()), Value::String(v.to_owned())),
            None => map.insert(Value::String(entry), Value::Null),
        };
    }
    Value::Mapping(map)
}

/// The merged configuration of `invocation` as YAML text. Identical inputs
/// give byte-identical output.
pub fn merged_config(invocation: &ComposeInvocation) -> Result<String, CoreError> {
    let documents = invocation
        .fragments
        .iter()
        .map(Fragment::document)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(serde_yaml::to_string(&merge_documents(documents))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl_schema::ExtensionRegistry;
    use std::fs;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn context() -> (TempDir, ContextLayout) {
        let repo = tempfile::tempdir().unwrap();
        let root = repo.path().join("docker");
        fs::create_dir_all(&root).unwrap();
        fs::write(
            root.join("docker-compose.yaml"),
            "services:\n  isaac-lab-base:\n    image: isaac-lab-base\n",
        )
        .unwrap();
        fs::write(root.join(".env.base"), "DOCKER_ISAACLAB_PATH=/workspace/isaaclab\n").unwrap();
        fs::write(root.join("ros2.yaml"), "services:\n  isaac-lab-ros2:\n    image: isaac-lab-ros2\n")
            .unwrap();
        fs::write(root.join(".env.ros2"), "RMW_IMPLEMENTATION=rmw_fastrtps_cpp\n").unwrap();
        fs::write(root.join("x11.yaml"), "services: {}\n").unwrap();
        (repo, ContextLayout::new(root))
    }

    #[test]
    fn later_scalar_wins() {
        let merged = merge_documents([yaml("a: 1\nb: 2\n"), yaml("a: 3\n")]);
        assert_eq!(merged, yaml("a: 3\nb: 2\n"));
    }

    #[test]
    fn nested_maps_union() {
        let merged = merge_documents([
            yaml("services:\n  s:\n    image: x\n    ports: ['80']\n"),
            yaml("services:\n  s:\n    ports: ['443', '80']\n    tty: true\n"),
        ]);
        assert_eq!(
            merged,
            yaml("services:\n  s:\n    image: x\n    ports: ['80', '443']\n    tty: true\n")
        );
    }

    #[test]
    fn command_lists_are_replaced() {
        let merged = merge_documents([
            yaml("services:\n  s:\n    command: [sleep, '10']\n"),
            yaml("services:\n  s:\n    command: [bash]\n"),
        ]);
        assert_eq!(merged["services"]["s"]["command"], yaml("[bash]"));
    }

    #[test]
    fn volume_lists_merge_by_target() {
        let merged = merge_documents([
            yaml(
                "services:\n  s:\n    volumes:\n      - type: volume\n        source: cache\n        target: /root/.cache\n      - type: bind\n        source: /src\n        target: /workspace/src\n",
            ),
            yaml(
                "services:\n  s:\n    volumes:\n      - /tmp/.X11-unix:/tmp/.X11-unix:rw\n      - /other/src:/workspace/src\n",
            ),
        ]);
        let volumes = merged["services"]["s"]["volumes"].as_sequence().unwrap();
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[0]["source"], Value::String("cache".to_owned()));
        assert_eq!(volumes[1], Value::String("/other/src:/workspace/src".to_owned()));
        assert_eq!(volumes[2], Value::String("/tmp/.X11-unix:/tmp/.X11-unix:rw".to_owned()));
    }

    #[test]
    fn mount_targets_from_both_forms() {
        assert_eq!(mount_target(&yaml("target: /a")).as_deref(), Some("/a"));
        assert_eq!(mount_target(&yaml("'v:/b:ro'")).as_deref(), Some("/b"));
        assert_eq!(mount_target(&yaml("/anon")).as_deref(), Some("/anon"));
        assert_eq!(mount_target(&yaml("3")), None);
    }

    #[test]
    fn environment_lists_merge_as_maps() {
        let merged = merge_documents([
            yaml("services:\n  s:\n    environment:\n      - A=1\n      - B=2\n"),
            yaml("services:\n  s:\n    environment:\n      B: 3\n      C: '4'\n"),
        ]);
        let env = &merged["services"]["s"]["environment"];
        assert_eq!(env["A"], Value::String("1".to_owned()));
        assert_eq!(env["B"], Value::Number(3.into()));
        assert_eq!(env["C"], Value::String("4".to_owned()));
    }

    #[test]
    fn bare_label_becomes_null() {
        let merged = merge_documents([yaml("labels:\n  - com.example.flag\n")]);
        assert_eq!(merged["labels"]["com.example.flag"], Value::Null);
    }

    #[test]
    fn empty_documents_are_skipped() {
        let merged = merge_documents([yaml("a: 1\n"), Value::Null]);
        assert_eq!(merged, yaml("a: 1\n"));
    }

    #[test]
    fn base_order() {
        let (_repo, layout) = context();
        let ext = ExtensionRegistry::builtin().resolve(None).unwrap();
        let inv = compose(&layout, &ext, None, &ComposeExtras::default()).unwrap();
        assert_eq!(inv.project, "isaac-lab-base");
        assert_eq!(inv.fragments.len(), 2);
        assert_eq!(inv.fragments[0], Fragment::File(layout.base_fragment()));
        assert_eq!(inv.fragment_labels()[1], "<generated:volumes>");
        assert_eq!(inv.env_files, [layout.base_env_file()]);
        assert_eq!(inv.env, [("TARGET".to_owned(), "base".to_owned())]);
    }

    #[test]
    fn ros2_order_with_x11_and_extras() {
        let (repo, layout) = context();
        let extra = repo.path().join("mine.yaml");
        fs::write(&extra, "services: {}\n").unwrap();
        let ext = ExtensionRegistry::builtin().resolve(Some("ros2")).unwrap();
        let fwd = X11Forwarding {
            display: ":0".to_owned(),
            tmp_dir: PathBuf::from("/tmp/labctl-x11-t"),
        };
        let extras = ComposeExtras {
            fragments: vec![extra.clone()],
            env_files: Vec::new(),
        };
        let inv = compose(&layout, &ext, Some(&fwd), &extras).unwrap();
        assert_eq!(
            inv.fragment_labels(),
            [
                layout.base_fragment().display().to_string(),
                "<generated:volumes>".to_owned(),
                layout.root().join("ros2.yaml").display().to_string(),
                layout.x11_fragment().display().to_string(),
                extra.display().to_string(),
            ]
        );
        assert_eq!(
            inv.env_files,
            [layout.base_env_file(), layout.root().join(".env.ros2")]
        );
        assert!(inv.env.iter().any(|(k, _)| k == "__ISAACLAB_TMP_XAUTH"));
    }

    #[test]
    fn missing_fragment_is_reported() {
        let (repo, layout) = context();
        let ext = ExtensionRegistry::builtin().resolve(None).unwrap();
        let extras = ComposeExtras {
            fragments: Vec::new(),
            env_files: vec![repo.path().join(".env.nope")],
        };
        let err = compose(&layout, &ext, None, &extras).unwrap_err();
        assert!(matches!(err, CoreError::MissingFragment(p) if p.ends_with(".env.nope")));
    }

    #[test]
    fn generated_fragment_declares_named_volumes() {
        let (repo, layout) = context();
        let doc =
            volumes_fragment("isaac-lab-base", &layout, Path::new("/workspace/isaaclab"), &[]).unwrap();
        let decl = &doc["volumes"]["isaac-lab-logs"];
        assert_eq!(decl["name"], Value::String("isaac-lab-logs".to_owned()));

        let mounts = doc["services"]["isaac-lab-base"]["volumes"]
            .as_sequence()
            .unwrap();
        assert_eq!(mounts.len(), all_volumes().len() + all_bind_mounts().len());
        let source = repo.path().join("source").display().to_string();
        assert!(mounts.iter().any(|m| m["source"] == Value::String(source.clone())
            && m["target"] == Value::String("/workspace/isaaclab/source".to_owned())));
    }

    #[test]
    fn merged_config_is_stable() {
        let (_repo, layout) = context();
        let ext = ExtensionRegistry::builtin().resolve(Some("ros2")).unwrap();
        let a = merged_config(&compose(&layout, &ext, None, &ComposeExtras::default()).unwrap())
            .unwrap();
        let b = merged_config(&compose(&layout, &ext, None, &ComposeExtras::default()).unwrap())
            .unwrap();
        assert_eq!(a, b);
        assert!(a.contains("isaac-lab-ros2"));
        assert!(a.contains("isaac-cache-kit"));
    }

    #[test]
    fn materialize_writes_generated_fragment() {
        let (_repo, layout) = context();
        let ext = ExtensionRegistry::builtin().resolve(None).unwrap();
        let inv = compose(&layout, &ext, None, &ComposeExtras::default()).unwrap();
        let materialized = inv.materialize().unwrap();
        let spec = &materialized.spec;
        assert_eq!(spec.project, "isaac-lab-base");
        assert_eq!(spec.workdir, layout.root());
        assert!(spec.files.iter().all(|f| f.is_file()));
        assert!(spec.files[1].ends_with("volumes.yaml"));
    }
}
