//! In-memory ledger store used by tests and by development runs without
//! `DATABASE_URL`.

use super::{LedgerError, LedgerStore};
use crate::models::{
    default_genres, find_chain_break, EntryForm, JoinedEntry, LedgerEntry, NewEntry, Rebalanced,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

struct MemoryState {
    /// Sorted by id ascending.
    entries: Vec<LedgerEntry>,
    genres: HashMap<i64, String>,
}

pub struct InMemoryStore {
    opening_balance: i64,
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new(opening_balance: i64) -> Self {
        Self::with_entries(opening_balance, Vec::new())
    }

    /// Start from existing rows. Rows are stored as given, so a broken chain
    /// can be seeded on purpose.
    pub fn with_entries(opening_balance: i64, mut entries: Vec<LedgerEntry>) -> Self {
        entries.sort_by_key(|e| e.id);
        let genres = default_genres()
            .into_iter()
            .map(|g| (g.genre_id, g.genre))
            .collect();

        Self {
            opening_balance,
            state: Mutex::new(MemoryState { entries, genres }),
        }
    }

    /// Snapshot of all rows, ascending by id.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.lock()?.entries.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, LedgerError> {
        self.state.lock().map_err(|_| {
            LedgerError::DatastoreUnavailable(anyhow::anyhow!("In-memory store lock poisoned"))
        })
    }

    fn position(entries: &[LedgerEntry], id: i64) -> Result<usize, LedgerError> {
        entries
            .binary_search_by_key(&id, |e| e.id)
            .map_err(|_| LedgerError::NotFound(id))
    }

    /// Commit `working` only when the chain holds from `from_id` on.
    fn commit(
        state: &mut MemoryState,
        working: Vec<LedgerEntry>,
        from_id: i64,
    ) -> Result<(), LedgerError> {
        if let Some(broken) = find_chain_break(&working, from_id) {
            tracing::error!(entry_id = broken.id(), error = %broken, "Chain check failed, discarding changes");
            return Err(LedgerError::InvariantViolation(broken));
        }
        state.entries = working;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn list_entries(&self) -> Result<Vec<JoinedEntry>, LedgerError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .iter()
            .rev()
            .map(|e| JoinedEntry::new(e.clone(), state.genres.get(&e.genre).cloned()))
            .collect())
    }

    async fn get_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError> {
        let state = self.lock()?;
        let idx = Self::position(&state.entries, id)?;
        Ok(state.entries[idx].clone())
    }

    async fn create_entry(&self, form: &EntryForm) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.lock()?;
        let entry =
            NewEntry::after(state.entries.last(), self.opening_balance, form, Utc::now())?
                .into_entry();

        let mut working = state.entries.clone();
        working.push(entry.clone());
        Self::commit(&mut state, working, entry.id)?;

        tracing::info!(entry_id = entry.id, balance = entry.balance, "[MEMORY] Entry created");
        Ok(entry)
    }

    async fn update_entry(&self, id: i64, form: &EntryForm) -> Result<Rebalanced, LedgerError> {
        let mut state = self.lock()?;
        let idx = Self::position(&state.entries, id)?;
        let rebalanced = state.entries[idx].rebalance(form, Utc::now())?;

        let mut working = state.entries.clone();
        working[idx] = rebalanced.entry.clone();
        if rebalanced.difference != 0 {
            for later in working.iter_mut().skip(idx + 1) {
                later.balance = later
                    .balance
                    .checked_sub(rebalanced.difference)
                    .ok_or_else(|| LedgerError::overflow(later.balance, rebalanced.difference))?;
            }
        }
        Self::commit(&mut state, working, id)?;

        tracing::info!(
            entry_id = id,
            difference = rebalanced.difference,
            "[MEMORY] Entry updated"
        );
        Ok(rebalanced)
    }

    async fn delete_entry(&self, id: i64) -> Result<LedgerEntry, LedgerError> {
        let mut state = self.lock()?;
        let idx = Self::position(&state.entries, id)?;

        let mut working = state.entries.clone();
        let removed = working.remove(idx);
        for later in working.iter_mut().skip(idx) {
            later.balance = later
                .balance
                .checked_add(removed.amount)
                .ok_or_else(|| LedgerError::overflow(later.balance, removed.amount.saturating_neg()))?;
            later.id -= 1;
        }
        Self::commit(&mut state, working, id)?;

        tracing::info!(entry_id = id, amount = removed.amount, "[MEMORY] Entry deleted");
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(amount: i64) -> EntryForm {
        EntryForm {
            body: format!("spent {}", amount),
            amount,
            genre: 1,
        }
    }

    fn balances(store: &InMemoryStore) -> Vec<(i64, i64)> {
        store
            .entries()
            .unwrap()
            .iter()
            .map(|e| (e.id, e.balance))
            .collect()
    }

    #[tokio::test]
    async fn create_appends_with_running_balance() {
        let store = InMemoryStore::new(1000);
        store.create_entry(&form(100)).await.unwrap();
        let second = store.create_entry(&form(50)).await.unwrap();

        assert_eq!(second.id, 2);
        assert_eq!(second.balance, 850);
        assert_eq!(balances(&store), vec![(1, 900), (2, 850)]);
    }

    #[tokio::test]
    async fn update_cascades_difference() {
        let store = InMemoryStore::new(1000);
        for amount in [100, 50, 25] {
            store.create_entry(&form(amount)).await.unwrap();
        }

        let result = store.update_entry(1, &form(200)).await.unwrap();
        assert_eq!(result.difference, 100);
        assert_eq!(balances(&store), vec![(1, 800), (2, 750), (3, 725)]);
    }

    #[tokio::test]
    async fn update_of_last_entry_touches_only_it() {
        let store = InMemoryStore::new(0);
        store.create_entry(&form(10)).await.unwrap();
        store.create_entry(&form(20)).await.unwrap();

        store.update_entry(2, &form(5)).await.unwrap();
        assert_eq!(balances(&store), vec![(1, -10), (2, -15)]);
    }

    #[tokio::test]
    async fn delete_compacts_ids_and_restores_balances() {
        let store = InMemoryStore::new(1000);
        for amount in [100, 50, 25] {
            store.create_entry(&form(amount)).await.unwrap();
        }

        let removed = store.delete_entry(2).await.unwrap();
        assert_eq!(removed.amount, 50);
        assert_eq!(balances(&store), vec![(1, 900), (2, 875)]);

        let next = store.create_entry(&form(75)).await.unwrap();
        assert_eq!(next.id, 3);
        assert_eq!(next.balance, 800);
    }

    #[tokio::test]
    async fn missing_entries_are_not_found() {
        let store = InMemoryStore::new(0);
        assert!(matches!(
            store.get_entry(1).await,
            Err(LedgerError::NotFound(1))
        ));
        assert!(matches!(
            store.update_entry(4, &form(1)).await,
            Err(LedgerError::NotFound(4))
        ));
        assert!(matches!(
            store.delete_entry(2).await,
            Err(LedgerError::NotFound(2))
        ));
    }

    #[tokio::test]
    async fn broken_chain_rolls_back_update() {
        let now = Utc::now();
        let seeded = vec![
            LedgerEntry {
                id: 1,
                created_at: now,
                updated_at: now,
                amount: 100,
                body: String::new(),
                balance: 900,
                genre: 1,
            },
            LedgerEntry {
                id: 2,
                created_at: now,
                updated_at: now,
                amount: 50,
                body: String::new(),
                balance: 999,
                genre: 1,
            },
        ];
        let store = InMemoryStore::with_entries(1000, seeded.clone());

        let err = store.update_entry(1, &form(200)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
        assert_eq!(store.entries().unwrap(), seeded);
    }

    #[tokio::test]
    async fn list_joins_genre_names_newest_first() {
        let store = InMemoryStore::new(0);
        store.create_entry(&form(1)).await.unwrap();
        store
            .create_entry(&EntryForm {
                body: "unknown genre".to_string(),
                amount: 2,
                genre: 999,
            })
            .await
            .unwrap();

        let listed = store.list_entries().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, 2);
        assert_eq!(listed[0].genre, None);
        assert_eq!(listed[0].genre_id, 999);
        assert_eq!(listed[1].genre.as_deref(), Some("food"));
    }
}
