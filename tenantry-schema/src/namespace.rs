//! Validated PostgreSQL namespace (schema) names.

use crate::{SchemaError, SchemaResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace that holds global, cross-tenant tables.
pub const GLOBAL_NAMESPACE: &str = "public";

static NAMESPACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("namespace pattern is valid")
});

/// A namespace name that is safe to quote into DDL.
///
/// Tenant namespaces are lowercase identifiers of at most 63 bytes and may
/// not collide with `public`, `information_schema` or anything under `pg_`.
/// The global namespace is only reachable through [`NamespaceName::global`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceName(String);

impl NamespaceName {
    /// Validate a tenant namespace name.
    pub fn new(name: impl Into<String>) -> SchemaResult<Self> {
        let name = name.into();

        if !NAMESPACE_PATTERN.is_match(&name) {
            return Err(SchemaError::InvalidNamespace {
                reason: "must be a lowercase identifier of at most 63 characters".to_string(),
                name,
            });
        }

        if name == GLOBAL_NAMESPACE || name == "information_schema" || name.starts_with("pg_") {
            return Err(SchemaError::InvalidNamespace {
                reason: "reserved by PostgreSQL".to_string(),
                name,
            });
        }

        Ok(Self(name))
    }

    /// The shared `public` namespace.
    pub fn global() -> Self {
        Self(GLOBAL_NAMESPACE.to_string())
    }

    /// Whether this is the shared `public` namespace.
    pub fn is_global(&self) -> bool {
        self.0 == GLOBAL_NAMESPACE
    }

    /// Borrow the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `search_path` value for connections bound to this namespace.
    ///
    /// Tenant namespaces resolve first and fall back to `public`, so global
    /// tables stay reachable unqualified.
    pub fn search_path(&self) -> String {
        if self.is_global() {
            GLOBAL_NAMESPACE.to_string()
        } else {
            format!("{},{}", self.0, GLOBAL_NAMESPACE)
        }
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NamespaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NamespaceName {
    type Error = SchemaError;

    fn try_from(value: String) -> SchemaResult<Self> {
        if value == GLOBAL_NAMESPACE {
            return Ok(Self::global());
        }
        Self::new(value)
    }
}

impl From<NamespaceName> for String {
    fn from(value: NamespaceName) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["acme", "tenant_42", "_scratch", "school_alpha"] {
            assert!(NamespaceName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        let too_long = "x".repeat(64);
        for name in ["", "Acme", "acme-corp", "9lives", "acme;drop", "a b", too_long.as_str()] {
            assert!(
                matches!(NamespaceName::new(name), Err(SchemaError::InvalidNamespace { .. })),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_reserved_names() {
        for name in ["public", "information_schema", "pg_catalog", "pg_temp"] {
            let err = NamespaceName::new(name).unwrap_err();
            assert!(err.to_string().contains("reserved"));
        }
    }

    #[test]
    fn test_search_path() {
        assert_eq!(NamespaceName::new("acme").unwrap().search_path(), "acme,public");
        assert_eq!(NamespaceName::global().search_path(), "public");
        assert!(NamespaceName::global().is_global());
    }

    #[test]
    fn test_serde_accepts_global() {
        let ns: NamespaceName = serde_json::from_str("\"public\"").unwrap();
        assert!(ns.is_global());

        let ns: NamespaceName = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(ns.as_str(), "acme");

        assert!(serde_json::from_str::<NamespaceName>("\"Bad Name\"").is_err());
    }
}
