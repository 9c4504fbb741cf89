//! Ledger entry endpoints under `/items`.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::models::{EntryForm, JoinedEntry, LedgerEntry};
use crate::services::metrics::{ENTRIES_MUTATED_TOTAL, ERRORS_TOTAL};
use crate::services::LedgerError;
use crate::startup::AppState;

fn item_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid item id: {}", e.body_text())))
}

fn entry_form(payload: Result<Json<EntryForm>, JsonRejection>) -> Result<EntryForm, AppError> {
    let Json(form) = payload
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e.body_text())))?;
    form.validate()?;
    Ok(form)
}

/// Count the outcome of a mutation and convert the error for the response.
fn observe<T>(operation: &str, result: Result<T, LedgerError>) -> Result<T, AppError> {
    match result {
        Ok(value) => {
            ENTRIES_MUTATED_TOTAL
                .with_label_values(&[operation, "ok"])
                .inc();
            Ok(value)
        }
        Err(e) => {
            ENTRIES_MUTATED_TOTAL
                .with_label_values(&[operation, "error"])
                .inc();
            ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
            tracing::warn!(operation, error_type = e.kind(), error = %e, "Ledger mutation failed");
            Err(e.into())
        }
    }
}

#[tracing::instrument(skip(state))]
pub async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<JoinedEntry>>, AppError> {
    let entries = state.store.list_entries().await.map_err(|e| {
        ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        AppError::from(e)
    })?;

    tracing::debug!(count = entries.len(), "Listed entries");

    Ok(Json(entries))
}

#[tracing::instrument(skip(state, path))]
pub async fn get_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<LedgerEntry>, AppError> {
    let id = item_id(path)?;

    let entry = state.store.get_entry(id).await.map_err(|e| {
        ERRORS_TOTAL.with_label_values(&[e.kind()]).inc();
        AppError::from(e)
    })?;

    Ok(Json(entry))
}

#[tracing::instrument(skip(state, payload))]
pub async fn create_item(
    State(state): State<AppState>,
    payload: Result<Json<EntryForm>, JsonRejection>,
) -> Result<&'static str, AppError> {
    let form = entry_form(payload)?;

    let entry = observe("create", state.store.create_entry(&form).await)?;

    tracing::info!(
        entry_id = entry.id,
        amount = entry.amount,
        balance = entry.balance,
        "Created item"
    );

    Ok("created item!")
}

#[tracing::instrument(skip(state, path, payload))]
pub async fn update_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<EntryForm>, JsonRejection>,
) -> Result<&'static str, AppError> {
    let id = item_id(path)?;
    let form = entry_form(payload)?;

    let result = observe("update", state.store.update_entry(id, &form).await)?;

    tracing::info!(
        entry_id = id,
        difference = result.difference,
        balance = result.entry.balance,
        "Updated item"
    );

    Ok("updated item!")
}

#[tracing::instrument(skip(state, path))]
pub async fn delete_item(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<&'static str, AppError> {
    let id = item_id(path)?;

    let removed = observe("delete", state.store.delete_entry(id).await)?;

    tracing::info!(entry_id = id, amount = removed.amount, "Deleted item");

    Ok("item deleted")
}
