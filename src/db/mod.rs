//! SQLite persistence for the invited ledger.
//!
//! - `repo`: pool setup, migrations and the `invited_ledger` queries.
//! - `model`: row type mapped from `invited_ledger`.
//!
//! [`SqliteLedgerStore`] adapts the repository to the [`LedgerStore`] trait
//! used by the orchestrator.

pub mod model;
pub mod repo;

pub use repo::*;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::ledger::{LedgerEntry, LedgerStore, LEDGER_CAPACITY};

#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: Pool,
}

impl SqliteLedgerStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn load(&self, destination: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(repo::load_ledger(&self.pool, destination).await?)
    }

    async fn save(&self, destination: &str, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        repo::replace_ledger(&self.pool, destination, entries, LEDGER_CAPACITY).await?;
        Ok(())
    }

    async fn clear(&self, destination: Option<&str>) -> Result<(), LedgerError> {
        repo::clear_ledger(&self.pool, destination).await?;
        Ok(())
    }
}
