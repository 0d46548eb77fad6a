use crate::{InvokeError, InvokeResult};
use std::collections::HashMap;

/// Named entries with one optional fallback entry.
///
/// Lookups of unregistered names resolve to the fallback, so a single
/// generic reconciler can serve every component without a dedicated one.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: HashMap<String, T>,
    fallback: Option<String>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: None,
        }
    }
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, entry: T) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    /// Name of the entry used for components without a dedicated one.
    pub fn with_fallback(mut self, name: impl Into<String>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn resolve(&self, component: &str) -> InvokeResult<T> {
        if let Some(entry) = self.entries.get(component) {
            return Ok(entry.clone());
        }

        let fallback = self
            .fallback
            .as_deref()
            .and_then(|name| self.entries.get(name));
        match fallback {
            Some(entry) => {
                tracing::debug!(component, fallback = ?self.fallback, "Using fallback reconciler");
                Ok(entry.clone())
            }
            None => {
                tracing::error!(
                    component,
                    fallback = ?self.fallback,
                    registered = ?self.names(),
                    "No dedicated and no fallback reconciler found"
                );
                Err(InvokeError::NoFallbackReconciler {
                    component: component.to_string(),
                })
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}
