//! Namespace resolution
//!
//! Resolution order: explicit argument > configured default > "default".
//! The "shared" namespace is a cross-namespace read bucket; writing into it
//! requires the caller to name it explicitly.

use crate::error::{MnemoError, Result};

/// Cross-namespace read-mostly bucket
pub const SHARED_NAMESPACE: &str = "shared";

/// Resolves namespaces for reads and writes
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    default_namespace: Option<String>,
}

impl NamespaceResolver {
    pub fn new(default_namespace: Option<String>) -> Self {
        Self { default_namespace }
    }

    /// Resolve to a concrete namespace
    pub fn resolve(&self, explicit: Option<&str>) -> String {
        if let Some(ns) = explicit {
            return ns.to_string();
        }
        self.default_namespace
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    /// Reject writes landing in "shared" unless the caller opted in
    pub fn validate_shared_write(&self, resolved: &str, explicitly_given: bool) -> Result<()> {
        if resolved == SHARED_NAMESPACE && !explicitly_given {
            return Err(MnemoError::Validation(
                "writes to the shared namespace require naming it explicitly".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let resolver = NamespaceResolver::new(Some("project-x".to_string()));
        assert_eq!(resolver.resolve(Some("explicit")), "explicit");
        assert_eq!(resolver.resolve(None), "project-x");

        let bare = NamespaceResolver::default();
        assert_eq!(bare.resolve(None), "default");
    }

    #[test]
    fn test_shared_write_guard() {
        let resolver = NamespaceResolver::new(Some("shared".to_string()));
        assert!(resolver.validate_shared_write("shared", false).is_err());
        assert!(resolver.validate_shared_write("shared", true).is_ok());
        assert!(resolver.validate_shared_write("default", false).is_ok());
    }
}
