//! Scoped sessions handed to request handlers.

use crate::context::SessionContext;
use crate::TenancyResult;
use sea_orm::DatabaseTransaction;
use tenantry_schema::NamespaceName;
use tracing::debug;
use uuid::Uuid;

/// A database transaction bound to exactly one namespace for one request.
///
/// Use it anywhere SeaORM expects a connection (`&*session` or
/// [`transaction`](Self::transaction)). Call [`commit`](Self::commit) to keep
/// the work. Any other way of ending the session, including dropping it on
/// error, panic or cancellation, rolls back and releases the connection.
pub struct ScopedSession {
    context: SessionContext,
    namespace: NamespaceName,
    transaction: DatabaseTransaction,
}

impl std::fmt::Debug for ScopedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSession")
            .field("context", &self.context)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl ScopedSession {
    pub(crate) fn new(
        context: SessionContext,
        namespace: NamespaceName,
        transaction: DatabaseTransaction,
    ) -> Self {
        Self {
            context,
            namespace,
            transaction,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Namespace every statement in this session resolves against.
    pub fn namespace(&self) -> &NamespaceName {
        &self.namespace
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.context.tenant_id()
    }

    pub fn is_global(&self) -> bool {
        matches!(self.context, SessionContext::Global)
    }

    pub fn transaction(&self) -> &DatabaseTransaction {
        &self.transaction
    }

    /// Commit and release the connection.
    pub async fn commit(self) -> TenancyResult<()> {
        self.transaction.commit().await?;
        debug!(namespace = %self.namespace, "Session committed");
        Ok(())
    }

    /// Roll back and release the connection.
    pub async fn rollback(self) -> TenancyResult<()> {
        self.transaction.rollback().await?;
        debug!(namespace = %self.namespace, "Session rolled back");
        Ok(())
    }

    /// End the session without keeping uncommitted work.
    pub async fn close(self) -> TenancyResult<()> {
        self.rollback().await
    }
}

impl std::ops::Deref for ScopedSession {
    type Target = DatabaseTransaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

impl AsRef<DatabaseTransaction> for ScopedSession {
    fn as_ref(&self) -> &DatabaseTransaction {
        &self.transaction
    }
}
