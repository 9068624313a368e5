//! # modhost — module lifecycle orchestration
//!
//! Composes an application out of independently developed modules:
//! determines their load order from declared dependencies, drives each
//! module through configure/install/initialize, reacts to mid-flight
//! requests to reinitialize or fully restart, and reverses the process on
//! shutdown — persisting per-module installed-version and status so
//! upgrades and uninstalls stay idempotent across process restarts.
//!
//! ## Pieces
//!
//! - [`Module`] / [`InstallableModule`] — the capability contract a module
//!   implements; hooks return a [`RequestedAction`].
//! - [`ModuleDescriptor`] — the persisted identity/status/installed-version
//!   record, owned by a [`DescriptorStore`].
//! - [`ModuleFactory`] / [`ModuleRegistry`] — turns a descriptor's type
//!   identifier into a live module instance.
//! - [`Application`] — the state machine tying it all together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use modhost::{Application, JsonFileStore, Module, ModuleRegistry};
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register("storage", || Arc::new(StorageModule::default()) as Arc<dyn Module>);
//! registry.register("api", || Arc::new(ApiModule::default()) as Arc<dyn Module>);
//!
//! let store = Arc::new(JsonFileStore::new("modules.json"));
//! let app = Application::new(store, Arc::new(registry));
//! app.start().await?;
//! // ...
//! app.stop().await?;
//! ```
//!
//! The application is a single-writer engine: one orchestration call runs
//! at a time, hooks execute sequentially on the caller's task in dependency
//! order, and there is no parallel hook execution.

pub mod app;
pub mod context;
pub mod contracts;
pub mod descriptor;
pub mod error;
pub mod registry;
mod resolver;

pub use app::{AppHandle, AppPhase, Application};
pub use context::ModuleCtx;
pub use contracts::{InstallableModule, Module, RequestedAction};
pub use descriptor::{
    DescriptorStore, JsonFileStore, MemoryDescriptorStore, ModuleDescriptor, ModuleStatus,
};
pub use error::LifecycleError;
pub use registry::{InstantiateError, ModuleFactory, ModuleRegistry};
