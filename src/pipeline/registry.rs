//! Registry of filter modules, keyed by registration.
//!
//! Filled at startup by whoever loads modules; nodes are created from it by
//! registration pattern.

use crate::pipeline::node::{FilterCore, Runner};
use crate::pipeline::registration;
use std::sync::Arc;

/// A core paired with its runner.
#[derive(Clone)]
pub struct FilterModule {
    pub core: Arc<dyn FilterCore>,
    pub runner: Arc<dyn Runner>,
}

impl FilterModule {
    pub fn new(core: impl FilterCore + 'static, runner: impl Runner + 'static) -> Self {
        Self {
            core: Arc::new(core),
            runner: Arc::new(runner),
        }
    }

    pub fn registration(&self) -> &str {
        self.core.registration()
    }
}

impl std::fmt::Debug for FilterModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterModule")
            .field("registration", &self.registration())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<FilterModule>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::pipeline::nodes::register_builtins(&mut registry);
        registry
    }

    /// Add a module, replacing one with the same registration.
    pub fn register(&mut self, module: FilterModule) {
        let reg = module.registration().to_string();
        match self.modules.iter_mut().find(|m| m.registration() == reg) {
            Some(existing) => {
                tracing::debug!("Replacing module '{}'", reg);
                *existing = module;
            }
            None => {
                tracing::debug!("Registered module '{}'", reg);
                self.modules.push(module);
            }
        }
    }

    /// Find a module by pattern. An exact registration wins over a pattern match;
    /// otherwise the first registered match is used.
    pub fn resolve(&self, pattern: &str) -> Option<&FilterModule> {
        if pattern.trim().is_empty() {
            return None;
        }
        self.modules
            .iter()
            .find(|m| m.registration() == pattern)
            .or_else(|| {
                self.modules
                    .iter()
                    .find(|m| registration::matches(pattern, m.registration()))
            })
    }

    pub fn registrations(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.registration())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
