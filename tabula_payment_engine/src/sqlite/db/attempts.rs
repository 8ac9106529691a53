use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{AttemptOutcome, IntentId, ProviderAttempt, ProviderId},
    traits::LedgerError,
};

#[derive(Debug, Clone, FromRow)]
struct AttemptRow {
    id: i64,
    intent_id: String,
    provider: String,
    attempt_ref: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<String>,
    provider_reference: Option<String>,
    raw_code: Option<String>,
}

impl From<AttemptRow> for ProviderAttempt {
    fn from(row: AttemptRow) -> Self {
        ProviderAttempt {
            id: row.id,
            intent_id: IntentId(row.intent_id),
            provider: ProviderId::from(row.provider),
            attempt_ref: row.attempt_ref,
            started_at: row.started_at,
            finished_at: row.finished_at,
            outcome: row.outcome.map(AttemptOutcome::from),
            provider_reference: row.provider_reference,
            raw_code: row.raw_code,
        }
    }
}

/// Opens an attempt row with a fresh merchant reference, `"{intent_id}/{seq}"`. The sequence read is a
/// subquery of the insert itself, so numbering is atomic without a surrounding transaction, and the UNIQUE
/// constraint on `attempt_ref` backstops it.
pub async fn insert_attempt(
    intent_id: &IntentId,
    provider: &ProviderId,
    conn: &mut SqliteConnection,
) -> Result<ProviderAttempt, LedgerError> {
    let row: AttemptRow = sqlx::query_as(
        r#"
            INSERT INTO provider_attempts (intent_id, provider, attempt_ref, started_at)
            VALUES (
                $1,
                $2,
                $1 || '/' || (SELECT COUNT(*) + 1 FROM provider_attempts WHERE intent_id = $1),
                $3
            )
            RETURNING *;
        "#,
    )
    .bind(intent_id.as_str())
    .bind(provider.as_str())
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Attempt {} opened against {provider}", row.attempt_ref);
    Ok(row.into())
}

/// Closes an attempt. Closed attempts are append-only history and cannot be written twice.
pub async fn complete_attempt(
    attempt_id: i64,
    outcome: AttemptOutcome,
    provider_reference: Option<&str>,
    raw_code: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<ProviderAttempt, LedgerError> {
    let row: Option<AttemptRow> = sqlx::query_as(
        r#"
            UPDATE provider_attempts
            SET finished_at = $1, outcome = $2, provider_reference = $3, raw_code = $4
            WHERE id = $5 AND finished_at IS NULL
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(outcome.to_string())
    .bind(provider_reference)
    .bind(raw_code)
    .bind(attempt_id)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            debug!("🗃️ Attempt {} closed with outcome {outcome}", row.attempt_ref);
            Ok(row.into())
        },
        None => {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM provider_attempts WHERE id = $1")
                .bind(attempt_id)
                .fetch_optional(conn)
                .await?;
            match exists {
                Some(_) => Err(LedgerError::AttemptAlreadyClosed(attempt_id)),
                None => Err(LedgerError::AttemptNotFound(attempt_id)),
            }
        },
    }
}

pub async fn attempts_for_intent(
    intent_id: &IntentId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProviderAttempt>, LedgerError> {
    let rows: Vec<AttemptRow> =
        sqlx::query_as("SELECT * FROM provider_attempts WHERE intent_id = $1 ORDER BY id ASC")
            .bind(intent_id.as_str())
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(ProviderAttempt::from).collect())
}

pub async fn intent_id_for_attempt_ref(
    attempt_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IntentId>, LedgerError> {
    let id: Option<String> = sqlx::query_scalar("SELECT intent_id FROM provider_attempts WHERE attempt_ref = $1")
        .bind(attempt_ref)
        .fetch_optional(conn)
        .await?;
    Ok(id.map(IntentId))
}

/// Closes every attempt that has been open longer than `older_than` as a timeout. Returns the closed rows.
pub async fn sweep_stale_attempts(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProviderAttempt>, LedgerError> {
    let cutoff = Utc::now() - older_than;
    let rows: Vec<AttemptRow> = sqlx::query_as(
        r#"
            UPDATE provider_attempts
            SET finished_at = $1, outcome = 'Timeout', raw_code = 'stale_attempt_sweep'
            WHERE finished_at IS NULL AND started_at < $2
            RETURNING *;
        "#,
    )
    .bind(Utc::now())
    .bind(cutoff)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(ProviderAttempt::from).collect())
}
