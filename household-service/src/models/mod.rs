//! Domain models for household-service.

mod chain;
mod entry;
mod genre;

pub use chain::{find_chain_break, ChainBreak, ChainLink};
pub use entry::{EntryForm, JoinedEntry, LedgerEntry, NewEntry, Rebalanced, MAX_REMARK_LEN};
pub use genre::{default_genres, Genre, DEFAULT_GENRES};
