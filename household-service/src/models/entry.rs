//! Ledger entry model for the household running-balance ledger.

use crate::services::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Maximum remark length, matching the `remark` column.
pub const MAX_REMARK_LEN: usize = 1024;

/// Single row of `main_list`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(rename = "amount_money")]
    pub amount: i64,
    #[sqlx(rename = "remark")]
    pub body: String,
    pub balance: i64,
    pub genre: i64,
}

/// Entry joined with its genre display name, as served by the list view.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(rename = "amount_money")]
    pub amount: i64,
    #[sqlx(rename = "remark")]
    pub body: String,
    pub balance: i64,
    /// Display name; `None` when the lookup row is missing.
    pub genre: Option<String>,
    pub genre_id: i64,
}

impl JoinedEntry {
    pub fn new(entry: LedgerEntry, genre_name: Option<String>) -> Self {
        Self {
            id: entry.id,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
            amount: entry.amount,
            body: entry.body,
            balance: entry.balance,
            genre: genre_name,
            genre_id: entry.genre,
        }
    }
}

/// Request body for create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EntryForm {
    #[serde(rename = "title")]
    #[validate(length(max = 1024, message = "Remark cannot exceed 1024 characters"))]
    pub body: String,
    pub amount: i64,
    pub genre: i64,
}

/// Fully computed row ready to be appended after the current last entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub amount: i64,
    pub body: String,
    pub balance: i64,
    pub genre: i64,
}

impl NewEntry {
    /// Build the row that follows `last`.
    ///
    /// An empty ledger starts at id 1 with `opening_balance` as the
    /// predecessor balance.
    pub fn after(
        last: Option<&LedgerEntry>,
        opening_balance: i64,
        form: &EntryForm,
        now: DateTime<Utc>,
    ) -> Result<Self, LedgerError> {
        let (last_id, last_balance) = match last {
            Some(entry) => (entry.id, entry.balance),
            None => (0, opening_balance),
        };

        let balance = last_balance
            .checked_sub(form.amount)
            .ok_or_else(|| LedgerError::overflow(last_balance, form.amount))?;
        let id = last_id
            .checked_add(1)
            .ok_or_else(|| LedgerError::Validation("Entry id space exhausted".to_string()))?;

        Ok(Self {
            id,
            created_at: now,
            amount: form.amount,
            body: form.body.clone(),
            balance,
            genre: form.genre,
        })
    }

    pub fn into_entry(self) -> LedgerEntry {
        LedgerEntry {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.created_at,
            amount: self.amount,
            body: self.body,
            balance: self.balance,
            genre: self.genre,
        }
    }
}

/// Outcome of re-pricing an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebalanced {
    pub entry: LedgerEntry,
    /// `new_amount - old_amount`; every later balance moves by `-difference`.
    pub difference: i64,
}

impl LedgerEntry {
    /// Apply `form` to this entry, keeping id and creation time.
    pub fn rebalance(&self, form: &EntryForm, now: DateTime<Utc>) -> Result<Rebalanced, LedgerError> {
        let difference = form
            .amount
            .checked_sub(self.amount)
            .ok_or_else(|| LedgerError::overflow(form.amount, self.amount))?;
        let balance = self
            .balance
            .checked_sub(difference)
            .ok_or_else(|| LedgerError::overflow(self.balance, difference))?;

        Ok(Rebalanced {
            entry: LedgerEntry {
                id: self.id,
                created_at: self.created_at,
                updated_at: now,
                amount: form.amount,
                body: form.body.clone(),
                balance,
                genre: form.genre,
            },
            difference,
        })
    }
}
