//! Per-hook execution context.

use semver::Version;

use crate::app::AppHandle;

/// Value handed to every lifecycle hook.
///
/// A fresh context is created for each hook invocation; it carries a handle
/// back to the application and the version the module was installed at when
/// the hook fired.
#[derive(Clone)]
pub struct ModuleCtx {
    app: AppHandle,
    previous_version: Version,
}

impl ModuleCtx {
    pub(crate) fn new(app: AppHandle, previous_version: Version) -> Self {
        Self {
            app,
            previous_version,
        }
    }

    /// Handle back to the owning application.
    #[inline]
    pub fn app(&self) -> &AppHandle {
        &self.app
    }

    /// Version recorded by the last install, or `0.0.0` when the module has
    /// never been installed.
    #[inline]
    pub fn previous_version(&self) -> &Version {
        &self.previous_version
    }

    /// True when the module has never been installed before.
    pub fn is_first_install(&self) -> bool {
        self.previous_version == Version::new(0, 0, 0)
    }
}
