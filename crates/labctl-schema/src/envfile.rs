use crate::SchemaError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lab tree location inside the container when no env file sets it.
pub const DEFAULT_LAB_ROOT: &str = "/workspace/isaaclab";
const LAB_ROOT_KEY: &str = "DOCKER_ISAACLAB_PATH";

/// Read env files in order into one map. Later files win on identical keys,
/// matching how compose layers `--env-file` arguments.
pub fn load_dot_vars(paths: &[PathBuf]) -> Result<BTreeMap<String, String>, SchemaError> {
    let mut vars = BTreeMap::new();
    for path in paths {
        let iter = dotenvy::from_path_iter(path).map_err(|e| env_error(path, &e))?;
        for item in iter {
            let (key, value) = item.map_err(|e| env_error(path, &e))?;
            vars.insert(key, value);
        }
    }
    Ok(vars)
}

/// Container-side lab root taken from layered env vars.
pub fn lab_root(vars: &BTreeMap<String, String>) -> PathBuf {
    PathBuf::from(
        vars.get(LAB_ROOT_KEY)
            .map_or(DEFAULT_LAB_ROOT, String::as_str),
    )
}

fn env_error(path: &Path, e: &dotenvy::Error) -> SchemaError {
    SchemaError::EnvFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join(".env.base");
        let ros2 = dir.path().join(".env.ros2");
        fs::write(&base, "ACCEPT_EULA=Y\nROS_DOMAIN_ID=0\n").unwrap();
        fs::write(&ros2, "# ros2 overrides\nROS_DOMAIN_ID=7\nRMW=cyclonedds\n").unwrap();

        let vars = load_dot_vars(&[base, ros2]).unwrap();
        assert_eq!(vars["ACCEPT_EULA"], "Y");
        assert_eq!(vars["ROS_DOMAIN_ID"], "7");
        assert_eq!(vars["RMW"], "cyclonedds");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dot_vars(&[dir.path().join(".env.nope")]).unwrap_err();
        assert!(err.to_string().contains(".env.nope"));
    }

    #[test]
    fn lab_root_default_and_override() {
        let mut vars = BTreeMap::new();
        assert_eq!(lab_root(&vars), PathBuf::from(DEFAULT_LAB_ROOT));
        vars.insert(LAB_ROOT_KEY.to_owned(), "/opt/lab".to_owned());
        assert_eq!(lab_root(&vars), PathBuf::from("/opt/lab"));
    }
}
