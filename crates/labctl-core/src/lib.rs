//! Policy layer for labctl.
//!
//! This crate ties the schema, store, and runtime layers together into the
//! `Engine`: it composes ordered compose fragments with a last-wins merge,
//! negotiates X11 forwarding once per context, checks instance preconditions
//! before each lifecycle command, and copies run artifacts back to the host.

pub mod artifacts;
pub mod compose;
pub mod engine;
pub mod lifecycle;
pub mod negotiate;

pub use artifacts::{copy_artifacts, ArtifactItem, CopyFailure, CopyReport, ARTIFACT_ITEMS};
pub use compose::{
    compose, merge_documents, merged_config, volumes_fragment, ComposeExtras, ComposeInvocation,
    Fragment, Materialized,
};
pub use engine::{
    BuildOutcome, ConfigOutcome, Engine, ExtensionStatus, StartOutcome, StopOutcome,
};
pub use lifecycle::{check_precondition, Command};
pub use negotiate::{negotiation_needed, plan_x11, X11Forwarding, X11Plan, XauthStep};

use labctl_runtime::InstanceState;
use labctl_schema::SchemaError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown extension '{name}' (known: {})", known.join(", "))]
    UnknownExtension { name: String, known: Vec<String> },
    #[error("missing fragment: {} does not exist", .0.display())]
    MissingFragment(PathBuf),
    #[error(
        "display authorization unavailable: {reason}; delete {} and retry",
        statefile.display()
    )]
    MissingDisplayAuth { reason: String, statefile: PathBuf },
    #[error("instance '{name}' is not running (state: {state})")]
    InstanceNotRunning { name: String, state: InstanceState },
    #[error("schema error: {0}")]
    Schema(SchemaError),
    #[error("store error: {0}")]
    Store(#[from] labctl_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] labctl_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<SchemaError> for CoreError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::UnknownExtension { name, known } => {
                CoreError::UnknownExtension { name, known }
            }
            other => CoreError::Schema(other),
        }
    }
}
