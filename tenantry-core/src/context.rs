//! Per-request tenant context.
//!
//! A [`RequestContext`] carries the inputs the router needs (tenant header
//! value, `Host`) and records how far resolution got. The HTTP layer builds
//! one per request; nothing here depends on a particular framework.

use crate::{TenancyError, TenancyResult};
use std::fmt;
use tenantry_config::ResolutionSettings;
use tenantry_schema::NamespaceName;
use uuid::Uuid;

/// Kind of session a request ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Global,
    Tenant,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Global => write!(f, "Global"),
            ContextKind::Tenant => write!(f, "Tenant"),
        }
    }
}

/// What a scoped session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionContext {
    /// The shared `public` namespace.
    Global,
    /// One tenant's namespace.
    Tenant {
        tenant_id: Uuid,
        namespace: NamespaceName,
    },
}

impl SessionContext {
    pub fn kind(&self) -> ContextKind {
        match self {
            SessionContext::Global => ContextKind::Global,
            SessionContext::Tenant { .. } => ContextKind::Tenant,
        }
    }

    pub fn namespace(&self) -> NamespaceName {
        match self {
            SessionContext::Global => NamespaceName::global(),
            SessionContext::Tenant { namespace, .. } => namespace.clone(),
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            SessionContext::Global => None,
            SessionContext::Tenant { tenant_id, .. } => Some(*tenant_id),
        }
    }
}

/// Resolution progress for one request.
///
/// `Unresolved` moves to exactly one of the other states. `TenantPending`
/// may still move to `TenantReady` or `Rejected`. `Rejected` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantContextState {
    Unresolved,
    Global,
    TenantPending { tenant_id: Uuid, namespace: NamespaceName },
    TenantReady { tenant_id: Uuid, namespace: NamespaceName },
    Rejected { status: u16, code: &'static str },
}

/// Inputs and state for resolving one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    tenant_header: Option<String>,
    host: Option<String>,
    state: TenantContextState,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            tenant_header: None,
            host: None,
            state: TenantContextState::Unresolved,
        }
    }

    /// Value of the configured tenant header, if present.
    pub fn with_tenant_header(mut self, value: impl Into<String>) -> Self {
        self.tenant_header = Some(value.into());
        self
    }

    /// Value of the `Host` header, if present.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Build from header pairs, picking the configured tenant header and
    /// `Host` case-insensitively.
    pub fn from_headers<'a, I>(headers: I, settings: &ResolutionSettings) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut ctx = Self::new();
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(&settings.tenant_header) {
                ctx.tenant_header = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("host") {
                ctx.host = Some(value.to_string());
            }
        }
        ctx
    }

    pub fn tenant_header(&self) -> Option<&str> {
        self.tenant_header.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn state(&self) -> &TenantContextState {
        &self.state
    }

    /// Kind of context once resolved far enough to know it.
    pub fn kind(&self) -> Option<ContextKind> {
        match self.state {
            TenantContextState::Global => Some(ContextKind::Global),
            TenantContextState::TenantPending { .. } | TenantContextState::TenantReady { .. } => {
                Some(ContextKind::Tenant)
            }
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, TenantContextState::Rejected { .. })
    }

    /// The tenant identifier for this request.
    ///
    /// The header wins when present and non-empty. Otherwise the `Host`
    /// subdomain is used if fallback is enabled. Identifiers are lowercased.
    pub fn identifier(&self, settings: &ResolutionSettings) -> Option<String> {
        if let Some(value) = self.tenant_header.as_deref().map(str::trim) {
            if !value.is_empty() {
                return Some(value.to_lowercase());
            }
        }

        if settings.subdomain_fallback {
            return self.host.as_deref().and_then(extract_subdomain);
        }

        None
    }

    pub(crate) fn advance(&mut self, next: TenantContextState) {
        let allowed = match (&self.state, &next) {
            (TenantContextState::Rejected { .. }, _) => false,
            (TenantContextState::Unresolved, _) => true,
            (TenantContextState::TenantPending { .. }, TenantContextState::TenantReady { .. }) => true,
            (_, TenantContextState::Rejected { .. }) => true,
            _ => false,
        };

        if allowed {
            self.state = next;
        } else {
            tracing::warn!(from = ?self.state, to = ?next, "Ignoring invalid tenant context transition");
        }
    }

    pub(crate) fn reject(&mut self, err: &TenancyError) {
        self.advance(TenantContextState::Rejected {
            status: err.status_code(),
            code: err.code(),
        });
    }
}

/// First label of a host name, when it names a tenant.
///
/// The port is ignored. Hosts with two labels or fewer (`example.com`,
/// `localhost`), IPv4 addresses and the `www` label carry no tenant.
pub fn extract_subdomain(host: &str) -> Option<String> {
    let host = host.trim();
    let host = host.split(':').next().unwrap_or(host);
    let labels: Vec<&str> = host.split('.').collect();

    if labels.len() <= 2 || labels.iter().all(|label| is_numeric(label)) {
        return None;
    }

    let first = labels[0].trim().to_lowercase();
    if first.is_empty() || first == "www" {
        return None;
    }

    Some(first)
}

fn is_numeric(label: &str) -> bool {
    !label.is_empty() && label.bytes().all(|b| b.is_ascii_digit())
}

/// Fail unless the session is bound to the global namespace.
pub fn require_global_context(context: &SessionContext) -> TenancyResult<()> {
    match context {
        SessionContext::Global => Ok(()),
        SessionContext::Tenant { .. } => Err(TenancyError::WrongContext {
            required: ContextKind::Global,
        }),
    }
}

/// Fail unless the session is bound to a tenant; returns the tenant id.
pub fn require_tenant_context(context: &SessionContext) -> TenancyResult<Uuid> {
    match context {
        SessionContext::Tenant { tenant_id, .. } => Ok(*tenant_id),
        SessionContext::Global => Err(TenancyError::WrongContext {
            required: ContextKind::Tenant,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ResolutionSettings {
        ResolutionSettings::default()
    }

    #[test]
    fn test_extract_subdomain() {
        assert_eq!(extract_subdomain("acme.school.io"), Some("acme".to_string()));
        assert_eq!(extract_subdomain("Acme.school.io:8443"), Some("acme".to_string()));
        assert_eq!(extract_subdomain("api.school.io"), Some("api".to_string()));
        assert_eq!(extract_subdomain("www.school.io"), None);
        assert_eq!(extract_subdomain("school.io"), None);
        assert_eq!(extract_subdomain("localhost:8000"), None);
        assert_eq!(extract_subdomain(".school.io"), None);
        assert_eq!(extract_subdomain("10.0.0.5:8000"), None);
        assert_eq!(extract_subdomain("192.168.1.20"), None);
        assert_eq!(extract_subdomain("42.school.io"), Some("42".to_string()));
    }

    #[test]
    fn test_header_wins_over_host() {
        let ctx = RequestContext::new()
            .with_tenant_header(" Acme-Corp ")
            .with_host("other.school.io");

        assert_eq!(ctx.identifier(&settings()), Some("acme-corp".to_string()));
    }

    #[test]
    fn test_host_fallback() {
        let ctx = RequestContext::new().with_tenant_header("").with_host("acme.school.io");
        assert_eq!(ctx.identifier(&settings()), Some("acme".to_string()));

        let disabled = ResolutionSettings {
            subdomain_fallback: false,
            ..settings()
        };
        assert_eq!(ctx.identifier(&disabled), None);
    }

    #[test]
    fn test_no_identifier() {
        assert_eq!(RequestContext::new().identifier(&settings()), None);
        assert_eq!(
            RequestContext::new().with_host("school.io").identifier(&settings()),
            None
        );
    }

    #[test]
    fn test_from_headers_is_case_insensitive() {
        let ctx = RequestContext::from_headers(
            [("x-tenant-id", "acme-corp"), ("HOST", "acme.school.io"), ("accept", "*/*")],
            &settings(),
        );

        assert_eq!(ctx.tenant_header(), Some("acme-corp"));
        assert_eq!(ctx.host(), Some("acme.school.io"));
    }

    #[test]
    fn test_state_transitions() {
        let ns = NamespaceName::new("acme").unwrap();
        let id = Uuid::new_v4();
        let mut ctx = RequestContext::new();

        ctx.advance(TenantContextState::TenantPending { tenant_id: id, namespace: ns.clone() });
        assert_eq!(ctx.kind(), Some(ContextKind::Tenant));

        ctx.advance(TenantContextState::TenantReady { tenant_id: id, namespace: ns.clone() });
        assert!(matches!(ctx.state(), TenantContextState::TenantReady { .. }));

        // Ready does not go back to pending
        ctx.advance(TenantContextState::TenantPending { tenant_id: id, namespace: ns });
        assert!(matches!(ctx.state(), TenantContextState::TenantReady { .. }));
    }

    #[test]
    fn test_rejected_is_terminal() {
        let mut ctx = RequestContext::new();
        ctx.reject(&TenancyError::TenantNotSpecified);
        assert_eq!(ctx.state(), &TenantContextState::Rejected { status: 400, code: "tenant_not_specified" });

        ctx.advance(TenantContextState::Global);
        assert!(ctx.is_rejected());
        assert_eq!(ctx.kind(), None);
    }

    #[test]
    fn test_context_guards() {
        let tenant = SessionContext::Tenant {
            tenant_id: Uuid::new_v4(),
            namespace: NamespaceName::new("acme").unwrap(),
        };

        assert!(require_global_context(&SessionContext::Global).is_ok());
        assert!(require_tenant_context(&tenant).is_ok());

        let err = require_global_context(&tenant).unwrap_err();
        assert_eq!(err.status_code(), 403);

        let err = require_tenant_context(&SessionContext::Global).unwrap_err();
        assert!(matches!(err, TenancyError::WrongContext { required: ContextKind::Tenant }));
    }
}
