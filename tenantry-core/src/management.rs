//! Tenant administration
//!
//! Lifecycle operations for tenants: creation with provisioning,
//! deactivation with cache eviction, reactivation, renames and listing.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tenantry_core::management::*;
//!
//! let admin = TenantAdmin::new(directory, provisioner, registry, settings, "basic");
//!
//! let tenant = admin
//!     .create_tenant(CreateTenantRequest::new("acme", "acme-corp").with_billing_tier("premium"))
//!     .await?;
//!
//! admin.deactivate_tenant(tenant.id).await?;
//! admin.activate_tenant(tenant.id).await?;
//! ```

use crate::directory::{Page, TenantDirectory, TenantFilter, TenantRecord};
use crate::provisioner::TenantProvisioner;
use crate::registry::ConnectionRegistry;
use crate::{TenancyError, TenancyResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tenantry_config::ResolutionSettings;
use tenantry_schema::NamespaceName;
use tracing::info;
use uuid::Uuid;

/// DNS label: lowercase letters, digits and inner hyphens.
static PUBLIC_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("identifier pattern is valid")
});

/// Labels that never name a tenant.
const RESERVED_IDENTIFIERS: &[&str] = &["www"];

/// Request to create a new tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    pub namespace_name: String,
    pub public_identifier: String,
    /// Falls back to the configured default tier.
    #[serde(default)]
    pub billing_tier: Option<String>,
}

impl CreateTenantRequest {
    pub fn new(namespace_name: impl Into<String>, public_identifier: impl Into<String>) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            public_identifier: public_identifier.into(),
            billing_tier: None,
        }
    }

    pub fn with_billing_tier(mut self, tier: impl Into<String>) -> Self {
        self.billing_tier = Some(tier.into());
        self
    }
}

/// Tenant administration
pub struct TenantAdmin {
    directory: Arc<dyn TenantDirectory>,
    provisioner: Arc<TenantProvisioner>,
    registry: Arc<ConnectionRegistry>,
    settings: ResolutionSettings,
    default_billing_tier: String,
}

impl TenantAdmin {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        provisioner: Arc<TenantProvisioner>,
        registry: Arc<ConnectionRegistry>,
        settings: ResolutionSettings,
        default_billing_tier: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            provisioner,
            registry,
            settings,
            default_billing_tier: default_billing_tier.into(),
        }
    }

    /// Check that `identifier` can be used as a public identifier.
    pub fn validate_public_identifier(&self, identifier: &str) -> TenancyResult<()> {
        let invalid = |reason: &str| TenancyError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        };

        if !PUBLIC_IDENTIFIER.is_match(identifier) {
            return Err(invalid(
                "must be 1-63 lowercase letters, digits or hyphens, not starting or ending with a hyphen",
            ));
        }
        if identifier == self.settings.global_marker || RESERVED_IDENTIFIERS.contains(&identifier) {
            return Err(invalid("reserved"));
        }
        Ok(())
    }

    /// Create a tenant. The namespace is provisioned before the record is
    /// written, so a visible record always has its tables.
    pub async fn create_tenant(&self, request: CreateTenantRequest) -> TenancyResult<TenantRecord> {
        self.validate_public_identifier(&request.public_identifier)?;
        let namespace =
            NamespaceName::new(&request.namespace_name).map_err(|err| TenancyError::InvalidIdentifier {
                identifier: request.namespace_name.clone(),
                reason: err.to_string(),
            })?;

        if self
            .directory
            .find_by_public_identifier(&request.public_identifier)
            .await?
            .is_some()
        {
            return Err(TenancyError::Conflict(format!(
                "public identifier '{}' is already in use",
                request.public_identifier
            )));
        }
        if self.directory.find_by_namespace(namespace.as_str()).await?.is_some() {
            return Err(TenancyError::Conflict(format!(
                "namespace '{}' is already in use",
                namespace
            )));
        }

        self.provisioner.ensure_provisioned(namespace.as_str()).await?;

        let tier = request
            .billing_tier
            .unwrap_or_else(|| self.default_billing_tier.clone());
        let record = self
            .directory
            .insert(TenantRecord::new(namespace.as_str(), request.public_identifier).with_billing_tier(tier))
            .await?;

        info!(
            tenant_id = %record.id,
            namespace = %record.namespace_name,
            identifier = %record.public_identifier,
            "Tenant created"
        );
        Ok(record)
    }

    /// Get a tenant by id.
    pub async fn get_tenant(&self, id: Uuid) -> TenancyResult<TenantRecord> {
        self.directory
            .find_by_id(id)
            .await?
            .ok_or_else(|| TenancyError::TenantNotFound(id.to_string()))
    }

    /// Deactivate a tenant.
    ///
    /// New requests are refused immediately. The cached engine is disposed
    /// and the provisioning memo dropped; sessions already open finish on
    /// their own connections.
    pub async fn deactivate_tenant(&self, id: Uuid) -> TenancyResult<TenantRecord> {
        let mut record = self.get_tenant(id).await?;
        let namespace = record.namespace()?;

        if record.is_active {
            record.is_active = false;
            record.touch();
            record = self.directory.update(record).await?;
        }

        let evicted = self.registry.evict(&namespace).await?;
        self.provisioner.forget(&namespace);

        info!(tenant_id = %id, namespace = %namespace, evicted, "Tenant deactivated");
        Ok(record)
    }

    /// Reactivate a tenant.
    pub async fn activate_tenant(&self, id: Uuid) -> TenancyResult<TenantRecord> {
        let mut record = self.get_tenant(id).await?;
        if record.is_active {
            return Ok(record);
        }

        record.is_active = true;
        record.touch();
        let record = self.directory.update(record).await?;

        info!(tenant_id = %id, namespace = %record.namespace_name, "Tenant activated");
        Ok(record)
    }

    /// Change the identifier clients use to reach a tenant.
    pub async fn rename_public_identifier(&self, id: Uuid, new_identifier: &str) -> TenancyResult<TenantRecord> {
        self.validate_public_identifier(new_identifier)?;
        let mut record = self.get_tenant(id).await?;

        if record.public_identifier == new_identifier {
            return Ok(record);
        }
        if let Some(other) = self.directory.find_by_public_identifier(new_identifier).await? {
            if other.id != id {
                return Err(TenancyError::Conflict(format!(
                    "public identifier '{}' is already in use",
                    new_identifier
                )));
            }
        }

        let previous = std::mem::replace(&mut record.public_identifier, new_identifier.to_string());
        record.touch();
        let record = self.directory.update(record).await?;

        info!(tenant_id = %id, from = %previous, to = %new_identifier, "Tenant identifier renamed");
        Ok(record)
    }

    /// List tenants
    pub async fn list_tenants(&self, filter: &TenantFilter) -> TenancyResult<Page<TenantRecord>> {
        self.directory.list(filter).await
    }
}
