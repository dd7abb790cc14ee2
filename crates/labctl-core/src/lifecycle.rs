use crate::CoreError;
use labctl_runtime::InstanceState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Build,
    Config,
    Enter,
    Copy,
    Stop,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Build => "build",
            Command::Config => "config",
            Command::Enter => "enter",
            Command::Copy => "copy",
            Command::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Instance state a command requires before it may run.
///
/// `enter` needs a running instance and `stop` needs one that exists; every
/// other command accepts any state (`start` turns a running instance into a
/// no-op itself).
pub fn check_precondition(
    command: Command,
    container: &str,
    state: InstanceState,
) -> Result<(), CoreError> {
    let ok = match command {
        Command::Enter => state == InstanceState::Running,
        Command::Stop => state != InstanceState::Absent,
        Command::Start | Command::Build | Command::Config | Command::Copy => true,
    };

    if ok {
        Ok(())
    } else {
        Err(CoreError::InstanceNotRunning {
            name: container.to_owned(),
            state,
        })
    }
}
