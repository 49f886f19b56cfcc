//! Cross-process entity lock backed by PostgreSQL advisory locks

use crate::domain::lock::{EntityLock, LockGuard, LockKey};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement, TransactionTrait};
use std::sync::Arc;

/// Takes `pg_advisory_xact_lock` inside a dedicated transaction.
///
/// The guard owns that transaction; dropping it rolls back, which releases the
/// lock for every other worker on the same database.
pub struct PgAdvisoryLock {
    db: Arc<DatabaseConnection>,
}

impl PgAdvisoryLock {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntityLock for PgAdvisoryLock {
    async fn acquire(&self, key: LockKey) -> Result<LockGuard> {
        let txn = self.db.begin().await?;
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock($1)",
            [key.advisory_key().into()],
        ))
        .await?;
        tracing::debug!(lock = %key, "advisory lock taken");
        Ok(LockGuard::new(txn))
    }
}
