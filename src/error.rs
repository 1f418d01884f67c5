use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::salt::SaltError;

/// The network stages of a deployment, each bounded by its own timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clone,
    Setup,
    Login,
    Apply,
    Teardown,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Clone => write!(f, "git clone"),
            Stage::Setup => write!(f, "Salt setup"),
            Stage::Login => write!(f, "Salt login"),
            Stage::Apply => write!(f, "Salt apply"),
            Stage::Teardown => write!(f, "Salt teardown"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    #[error("{} already exists, refusing to clone over it", .0.display())]
    CloneDirExists(PathBuf),

    #[error("{stage} failed: {source}")]
    Salt {
        stage: Stage,
        #[source]
        source: SaltError,
    },

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },

    #[error("{stage} cancelled")]
    Cancelled { stage: Stage },

    #[error("clone task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DeployError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Config(_) => 2,
            _ => 1,
        }
    }
}
