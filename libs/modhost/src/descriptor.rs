//! Persisted module descriptors and the descriptor store collaborator.
//!
//! The application owns descriptor *contents* while running; the store owns
//! their persistence. Two stores ship with the crate: an in-process one for
//! tests and embedders that persist elsewhere, and a JSON-file-backed one.

use std::path::PathBuf;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Persisted enable/disable state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// The module participates in the lifecycle pipeline.
    Enabled,
    /// The module is kept out of the pipeline. A disabled module that was
    /// previously installed still loads so its uninstall can run.
    Disabled,
    /// The next teardown runs the module's uninstall hook and resets the
    /// descriptor to `Disabled` with no installed version.
    Uninstalling,
}

/// Persisted record of a module's identity, status and installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Stable type identifier the factory instantiates from.
    pub type_id: String,
    pub status: ModuleStatus,
    /// Version recorded by the last install; `None` means never installed.
    #[serde(default)]
    pub installed_version: Option<Version>,
}

impl ModuleDescriptor {
    pub fn new(type_id: impl Into<String>, status: ModuleStatus) -> Self {
        Self {
            type_id: type_id.into(),
            status,
            installed_version: None,
        }
    }

    /// Enabled descriptor that has never been installed.
    pub fn enabled(type_id: impl Into<String>) -> Self {
        Self::new(type_id, ModuleStatus::Enabled)
    }

    #[must_use]
    pub fn with_installed_version(mut self, version: Version) -> Self {
        self.installed_version = Some(version);
        self
    }
}

/// Persistence collaborator owning the descriptor set.
///
/// `save` is called by the application after every initialize/uninitialize,
/// regardless of outcome, with the full live list.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Load all descriptors; empty on first run.
    ///
    /// # Errors
    /// Any storage failure; surfaced to the caller of `Application::start`.
    async fn load(&self) -> anyhow::Result<Vec<ModuleDescriptor>>;

    /// Replace the persisted set with `descriptors`.
    ///
    /// # Errors
    /// Any storage failure.
    async fn save(&self, descriptors: &[ModuleDescriptor]) -> anyhow::Result<()>;
}

/// In-process descriptor store.
#[derive(Debug, Default)]
pub struct MemoryDescriptorStore {
    descriptors: Mutex<Vec<ModuleDescriptor>>,
}

impl MemoryDescriptorStore {
    pub fn new(descriptors: Vec<ModuleDescriptor>) -> Self {
        Self {
            descriptors: Mutex::new(descriptors),
        }
    }

    /// Currently persisted snapshot.
    pub fn snapshot(&self) -> Vec<ModuleDescriptor> {
        self.descriptors.lock().clone()
    }
}

#[async_trait]
impl DescriptorStore for MemoryDescriptorStore {
    async fn load(&self) -> anyhow::Result<Vec<ModuleDescriptor>> {
        Ok(self.descriptors.lock().clone())
    }

    async fn save(&self, descriptors: &[ModuleDescriptor]) -> anyhow::Result<()> {
        *self.descriptors.lock() = descriptors.to_vec();
        Ok(())
    }
}

/// Store persisting the descriptor list as a JSON document.
///
/// A missing file loads as an empty list, so the first run of a fresh
/// installation needs no provisioning step.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DescriptorStore for JsonFileStore {
    async fn load(&self) -> anyhow::Result<Vec<ModuleDescriptor>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("reading descriptors from {}", self.path.display())));
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing descriptors in {}", self.path.display()))
    }

    async fn save(&self, descriptors: &[ModuleDescriptor]) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(descriptors)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing descriptors to {}", self.path.display()))?;
        Ok(())
    }
}
