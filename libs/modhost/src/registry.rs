//! Module instantiation collaborator.
//!
//! Descriptors carry only a type identifier; turning one into a live module
//! is the factory's job. The shipped [`ModuleRegistry`] is a map of
//! constructors populated at process start.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::Module;

/// Failure to produce a module instance from a type identifier.
#[derive(Debug, Error)]
pub enum InstantiateError {
    /// The identifier is not known to the factory.
    #[error("module type '{0}' is not registered")]
    TypeNotFound(String),
    /// The identifier resolved to something that is not a module. Cannot
    /// arise from [`ModuleRegistry`]; reserved for factories that resolve
    /// identifiers dynamically.
    #[error("type '{0}' does not implement the module contract")]
    NotAModule(String),
}

/// Collaborator producing module instances from persisted type identifiers.
pub trait ModuleFactory: Send + Sync {
    /// Produce a fresh module instance for `type_id`.
    ///
    /// # Errors
    /// [`InstantiateError::TypeNotFound`] / [`InstantiateError::NotAModule`]
    /// for identifiers the factory cannot honor.
    fn instantiate(&self, type_id: &str) -> Result<Arc<dyn Module>, InstantiateError>;
}

type Constructor = Box<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// Factory backed by a map of constructors.
#[derive(Default)]
pub struct ModuleRegistry {
    constructors: HashMap<String, Constructor>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `type_id`, replacing any previous one.
    pub fn register<F>(&mut self, type_id: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.constructors.insert(type_id.into(), Box::new(constructor));
    }

    pub fn is_registered(&self, type_id: &str) -> bool {
        self.constructors.contains_key(type_id)
    }
}

impl ModuleFactory for ModuleRegistry {
    fn instantiate(&self, type_id: &str) -> Result<Arc<dyn Module>, InstantiateError> {
        let constructor = self
            .constructors
            .get(type_id)
            .ok_or_else(|| InstantiateError::TypeNotFound(type_id.to_owned()))?;
        Ok(constructor())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::context::ModuleCtx;
    use crate::contracts::RequestedAction;

    struct Noop;

    #[async_trait::async_trait]
    impl Module for Noop {
        async fn initialize(&self, _ctx: &ModuleCtx) -> anyhow::Result<RequestedAction> {
            Ok(RequestedAction::None)
        }

        async fn uninitialize(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn registered_constructor_is_used() {
        let mut registry = ModuleRegistry::new();
        registry.register("noop", || Arc::new(Noop) as Arc<dyn Module>);

        assert!(registry.is_registered("noop"));
        assert!(registry.instantiate("noop").is_ok());
    }

    #[test]
    fn unknown_type_reports_type_not_found() {
        let registry = ModuleRegistry::new();

        let err = registry.instantiate("ghost").err().unwrap();
        assert!(matches!(err, InstantiateError::TypeNotFound(id) if id == "ghost"));
    }
}
