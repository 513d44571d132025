//! Error taxonomy for tenant resolution and routing.

use crate::context::ContextKind;
use sea_orm::{ConnAcquireErr, DbErr};
use serde::Serialize;
use tenantry_config::ConfigError;
use tenantry_schema::{NamespaceName, SchemaError};
use thiserror::Error;

/// Errors surfaced at the request boundary.
///
/// Each kind maps to one stable HTTP status via [`status_code`](Self::status_code).
#[derive(Error, Debug)]
pub enum TenancyError {
    /// No tenant identifier in the header or host.
    #[error("Tenant not specified")]
    TenantNotSpecified,

    /// Identifier matches no tenant record.
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Tenant exists but has been deactivated.
    #[error("Tenant is inactive: {0}")]
    TenantInactive(String),

    /// The handler needs a different kind of session.
    #[error("{required} context required")]
    WrongContext {
        /// Context the caller asked for.
        required: ContextKind,
    },

    /// Identifier or namespace name is malformed or reserved.
    #[error("Invalid identifier {identifier:?}: {reason}")]
    InvalidIdentifier {
        /// Rejected value.
        identifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A unique tenant key is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request context was already resolved once.
    #[error("Request context already resolved")]
    AlreadyResolved,

    /// The table model cannot be cloned as written.
    #[error("Schema integrity error: {0}")]
    SchemaIntegrity(#[from] SchemaError),

    /// DDL failed while creating a namespace or its tables.
    #[error("Provisioning failed for namespace {namespace}: {reason}")]
    Provisioning {
        /// Namespace being provisioned.
        namespace: String,
        /// Underlying failure.
        reason: String,
    },

    /// No pooled connection became available in time.
    #[error("Timed out waiting for a database connection")]
    ConnectionTimeout,

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(DbErr),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for tenancy operations.
pub type TenancyResult<T> = Result<T, TenancyError>;

impl From<DbErr> for TenancyError {
    fn from(err: DbErr) -> Self {
        match err {
            DbErr::ConnectionAcquire(ConnAcquireErr::Timeout) => TenancyError::ConnectionTimeout,
            other => TenancyError::Database(other),
        }
    }
}

impl TenancyError {
    /// Wrap a failure raised while provisioning `namespace`.
    ///
    /// Timeouts stay timeouts so callers can still tell transient pool
    /// pressure apart from DDL failures.
    pub fn provisioning(namespace: &NamespaceName, err: impl Into<TenancyError>) -> Self {
        match err.into() {
            TenancyError::ConnectionTimeout => TenancyError::ConnectionTimeout,
            err @ TenancyError::Provisioning { .. } => err,
            err @ TenancyError::SchemaIntegrity(_) => err,
            other => TenancyError::Provisioning {
                namespace: namespace.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            TenancyError::TenantNotSpecified => 400,
            TenancyError::InvalidIdentifier { .. } => 400,
            TenancyError::TenantInactive(_) => 403,
            TenancyError::WrongContext { .. } => 403,
            TenancyError::TenantNotFound(_) => 404,
            TenancyError::Conflict(_) => 409,
            TenancyError::ConnectionTimeout => 503,
            TenancyError::AlreadyResolved
            | TenancyError::SchemaIntegrity(_)
            | TenancyError::Provisioning { .. }
            | TenancyError::Database(_)
            | TenancyError::Config(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            TenancyError::TenantNotSpecified => "tenant_not_specified",
            TenancyError::TenantNotFound(_) => "tenant_not_found",
            TenancyError::TenantInactive(_) => "tenant_inactive",
            TenancyError::WrongContext { .. } => "wrong_context",
            TenancyError::InvalidIdentifier { .. } => "invalid_identifier",
            TenancyError::Conflict(_) => "conflict",
            TenancyError::AlreadyResolved => "already_resolved",
            TenancyError::SchemaIntegrity(_) => "schema_integrity",
            TenancyError::Provisioning { .. } => "provisioning_failed",
            TenancyError::ConnectionTimeout => "connection_timeout",
            TenancyError::Database(_) => "database_error",
            TenancyError::Config(_) => "configuration_error",
        }
    }

    /// Message safe to return to a client. Server-side failures get a
    /// generic message; the detail belongs in the logs.
    pub fn client_message(&self) -> String {
        match self {
            TenancyError::TenantNotSpecified
            | TenancyError::TenantNotFound(_)
            | TenancyError::TenantInactive(_)
            | TenancyError::WrongContext { .. }
            | TenancyError::InvalidIdentifier { .. }
            | TenancyError::Conflict(_) => self.to_string(),
            TenancyError::ConnectionTimeout => "Database temporarily unavailable".to_string(),
            _ => "Internal server error".to_string(),
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TenancyError::ConnectionTimeout | TenancyError::Provisioning { .. }
        )
    }

    /// Check if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Structured response body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status_code(),
            code: self.code(),
            message: self.client_message(),
        }
    }
}

/// Structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
}
