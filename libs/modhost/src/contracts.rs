//! Lifecycle capability contracts for modules.
//!
//! Every module implements [`Module`]; modules that carry a persisted
//! installed version additionally implement [`InstallableModule`] and expose
//! it through [`Module::as_installable`].
//!
//! Hooks hand a [`RequestedAction`] back to the application instead of
//! mutating shared state, so the pipeline's control flow stays visible in
//! the signatures.

use async_trait::async_trait;
use semver::Version;

use crate::context::ModuleCtx;

/// Follow-up action a lifecycle hook hands back to the application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestedAction {
    /// Proceed with the pipeline.
    #[default]
    None,
    /// Abandon the current pipeline, unwind what it already did and run it
    /// again over the same module set.
    Reinitialize,
    /// Discard the module set entirely and begin again from descriptor
    /// loading. Use this after editing the descriptor list through
    /// [`crate::AppHandle`].
    Restart,
}

/// Core module contract.
///
/// `initialize` runs at most once per activation; `uninitialize` runs at
/// most once per activation and only if `initialize` ran. Neither is assumed
/// idempotent by the application.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    /// Identifiers of the modules this one must come after.
    fn dependencies(&self) -> &[&str] {
        &[]
    }

    /// Bring the module up. Runs after all declared dependencies have
    /// initialized. May run again after a reinitialize loop.
    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<RequestedAction>;

    /// Reverse of `initialize`, invoked during teardown in reverse
    /// dependency order.
    async fn uninitialize(&self) -> anyhow::Result<()>;

    /// The installable capability of this module, if it has one.
    fn as_installable(&self) -> Option<&dyn InstallableModule> {
        None
    }
}

/// Optional capability for modules whose installed version is persisted.
///
/// `configure` and `install` run only while the persisted version is missing
/// or older than [`build_version`](InstallableModule::build_version).
/// `configure` (like `initialize`) may repeat across reinitialize loops;
/// `install` and `uninstall` run exactly once per version transition.
#[async_trait]
pub trait InstallableModule: Module {
    /// Version this build of the module carries.
    fn build_version(&self) -> Version;

    /// First, version-gated hook of the pipeline, before `install`.
    async fn configure(&self, _ctx: &ModuleCtx) -> anyhow::Result<RequestedAction> {
        Ok(RequestedAction::None)
    }

    /// Version-gated hook after `configure`. Once it returns, the
    /// application records the build version and never runs it again for
    /// this version, even across restarts.
    async fn install(&self, ctx: &ModuleCtx) -> anyhow::Result<RequestedAction>;

    /// Invoked during teardown when the module's descriptor is marked
    /// [`Uninstalling`](crate::ModuleStatus::Uninstalling); afterwards the
    /// descriptor resets to disabled with no installed version.
    async fn uninstall(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}
