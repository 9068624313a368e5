//! Error surface of the lifecycle engine.

use thiserror::Error;

pub use crate::registry::InstantiateError;

/// Errors surfaced by the application's public operations.
///
/// Hook failures are wrapped per phase with the offending module's
/// identifier; the original error is the `source`. The application never
/// retries a failed operation on its own and never rolls back hook state on
/// failure — only a requested reinitialize/restart unwinds records.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// `start` while already started.
    #[error("application is already started")]
    AlreadyStarted,
    /// `initialize`/`uninitialize` while stopped.
    #[error("application is not started")]
    NotStarted,
    /// `stop` while already stopped.
    #[error("application is not running")]
    NotRunning,
    /// The resolver could not place every module. Lists every module still
    /// unplaced; a missing dependency and a dependency cycle are deliberately
    /// not distinguished.
    #[error("unresolved dependencies for modules: {}", .modules.join(", "))]
    UnresolvedDependencies { modules: Vec<String> },
    #[error(transparent)]
    Instantiate(#[from] InstantiateError),
    #[error("failed to load module descriptors")]
    LoadDescriptors(#[source] anyhow::Error),
    #[error("failed to save module descriptors")]
    SaveDescriptors(#[source] anyhow::Error),
    #[error("module '{module}' failed to configure")]
    Configure {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to install")]
    Install {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to initialize")]
    Initialize {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to uninitialize")]
    Uninitialize {
        module: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' failed to uninstall")]
    Uninstall {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}
