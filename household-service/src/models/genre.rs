//! Genre lookup rows joined into the list view.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Single row of `genre_list`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub genre_id: i64,
    pub genre: String,
}

/// Genres seeded by the initial migration. The in-memory store starts from the
/// same list.
pub const DEFAULT_GENRES: &[(i64, &str)] = &[
    (1, "food"),
    (2, "daily goods"),
    (3, "utilities"),
    (4, "rent"),
    (5, "transport"),
    (6, "entertainment"),
    (7, "income"),
    (8, "other"),
];

pub fn default_genres() -> Vec<Genre> {
    DEFAULT_GENRES
        .iter()
        .map(|(id, name)| Genre {
            genre_id: *id,
            genre: (*name).to_string(),
        })
        .collect()
}
