use super::LedgerError;
use crate::models::{EntryForm, JoinedEntry, LedgerEntry, Rebalanced};
use async_trait::async_trait;

/// Persistence seam for the ledger.
///
/// Implementations keep the running-balance chain intact: every mutation
/// either applies completely (row change, cascade, chain check) or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// All entries with genre names, newest (highest id) first.
    async fn list_entries(&self) -> Result<Vec<JoinedEntry>, LedgerError>;

    async fn get_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError>;

    /// Append a new entry after the current last one.
    async fn create_entry(&self, form: &EntryForm) -> Result<LedgerEntry, LedgerError>;

    /// Replace amount, remark and genre of `id` and shift every later balance
    /// by the amount difference.
    async fn update_entry(&self, id: i64, form: &EntryForm) -> Result<Rebalanced, LedgerError>;

    /// Remove `id`, give its amount back to every later balance and close the
    /// id gap. Returns the removed row.
    async fn delete_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError>;

    async fn health_check(&self) -> Result<(), LedgerError>;
}
