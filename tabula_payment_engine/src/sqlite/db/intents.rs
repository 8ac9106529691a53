use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};
use tab_common::Money;

use crate::{
    db_types::{IntentId, IntentStatus, NewPaymentIntent, PaymentIntent, ProviderId},
    traits::{CasOutcome, IntentUpdate, LedgerError},
};

#[derive(Debug, Clone, FromRow)]
struct IntentRow {
    id: String,
    order_id: String,
    amount: i64,
    currency: String,
    channel: String,
    card_origin: String,
    status: String,
    chosen_provider: Option<String>,
    provider_attempt_count: i64,
    attempted_providers: String,
    provider_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<IntentRow> for PaymentIntent {
    type Error = LedgerError;

    fn try_from(row: IntentRow) -> Result<Self, Self::Error> {
        let channel = row
            .channel
            .parse()
            .map_err(|e| LedgerError::DatabaseError(format!("Corrupt intent row {}: {e}", row.id)))?;
        let card_origin = row
            .card_origin
            .parse()
            .map_err(|e| LedgerError::DatabaseError(format!("Corrupt intent row {}: {e}", row.id)))?;
        let attempted_providers: Vec<ProviderId> = serde_json::from_str(&row.attempted_providers)
            .map_err(|e| LedgerError::DatabaseError(format!("Corrupt attempted_providers on {}: {e}", row.id)))?;
        Ok(PaymentIntent {
            id: IntentId(row.id),
            order_id: row.order_id,
            amount: Money::from(row.amount),
            currency: row.currency,
            channel,
            card_origin,
            status: IntentStatus::from(row.status),
            chosen_provider: row.chosen_provider.map(ProviderId::from),
            provider_attempt_count: row.provider_attempt_count,
            attempted_providers,
            provider_reference: row.provider_reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

/// Inserts the intent, returning `false` in the second parameter if an equivalent intent already exists.
/// A matching id with different charge details fails with [`LedgerError::IntentConflict`].
pub async fn idempotent_insert(
    intent: NewPaymentIntent,
    conn: &mut SqliteConnection,
) -> Result<(PaymentIntent, bool), LedgerError> {
    if let Some(existing) = fetch_intent(&intent.id, &mut *conn).await? {
        return if intent.is_equivalent(&existing) {
            Ok((existing, false))
        } else {
            Err(LedgerError::IntentConflict(intent.id))
        };
    }
    match insert_intent(&intent, &mut *conn).await? {
        Some(inserted) => {
            debug!("🗃️ Intent [{}] inserted for order {}", inserted.id, inserted.order_id);
            Ok((inserted, true))
        },
        // A concurrent create won the insert. Treat their row as ours, with the same equivalence check.
        None => {
            let existing =
                fetch_intent(&intent.id, conn).await?.ok_or_else(|| LedgerError::IntentNotFound(intent.id.clone()))?;
            if intent.is_equivalent(&existing) {
                Ok((existing, false))
            } else {
                Err(LedgerError::IntentConflict(intent.id))
            }
        },
    }
}

/// Returns `None` when the id already exists; `ON CONFLICT DO NOTHING` makes the duplicate-create race benign.
async fn insert_intent(
    intent: &NewPaymentIntent,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, LedgerError> {
    let now = Utc::now();
    let row: Option<IntentRow> = sqlx::query_as(
        r#"
            INSERT INTO payment_intents (
                id,
                order_id,
                amount,
                currency,
                channel,
                card_origin,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, 'Created', $7, $7)
            ON CONFLICT (id) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(intent.id.as_str())
    .bind(intent.order_id.as_str())
    .bind(intent.amount.value())
    .bind(intent.currency.as_str())
    .bind(intent.channel.to_string())
    .bind(intent.card_origin.to_string())
    .bind(now)
    .fetch_optional(conn)
    .await?;
    row.map(PaymentIntent::try_from).transpose()
}

pub async fn fetch_intent(id: &IntentId, conn: &mut SqliteConnection) -> Result<Option<PaymentIntent>, LedgerError> {
    let row: Option<IntentRow> = sqlx::query_as("SELECT * FROM payment_intents WHERE id = $1")
        .bind(id.as_str())
        .fetch_optional(conn)
        .await?;
    row.map(PaymentIntent::try_from).transpose()
}

/// The compare-and-swap write. The merged row is computed from a plain read, then written with a single
/// `UPDATE … WHERE version = $n RETURNING *`. That one statement is the atomic step: if any other writer got in
/// between, the guard matches nothing and the loser is handed the fresh row as a [`CasOutcome::Conflict`].
///
/// Deliberately not a multi-statement transaction. Two deferred transactions that each read and then write
/// deadlock under SQLite's lock upgrade and surface SQLITE_BUSY; single-statement writes just queue behind the
/// busy handler.
pub async fn cas_update(
    id: &IntentId,
    expected_version: i64,
    update: IntentUpdate,
    conn: &mut SqliteConnection,
) -> Result<CasOutcome, LedgerError> {
    let current =
        fetch_intent(id, &mut *conn).await?.ok_or_else(|| LedgerError::IntentNotFound(id.clone()))?;
    if current.version != expected_version {
        return Ok(CasOutcome::Conflict(current));
    }
    let status = update.status.unwrap_or(current.status);
    let chosen_provider = update.chosen_provider.or(current.chosen_provider);
    let provider_reference = update.provider_reference.or(current.provider_reference);
    let mut attempted = current.attempted_providers;
    let mut attempt_count = current.provider_attempt_count;
    if let Some(provider) = update.mark_attempted {
        if !attempted.contains(&provider) {
            attempted.push(provider);
            attempt_count += 1;
        }
    }
    let attempted_json = serde_json::to_string(&attempted)
        .map_err(|e| LedgerError::DatabaseError(format!("Could not encode attempted_providers: {e}")))?;
    let row: Option<IntentRow> = sqlx::query_as(
        r#"
            UPDATE payment_intents SET
                status = $1,
                chosen_provider = $2,
                provider_reference = $3,
                attempted_providers = $4,
                provider_attempt_count = $5,
                updated_at = $6,
                version = version + 1
            WHERE id = $7 AND version = $8
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(chosen_provider.as_ref().map(|p| p.as_str().to_string()))
    .bind(&provider_reference)
    .bind(attempted_json)
    .bind(attempt_count)
    .bind(Utc::now())
    .bind(id.as_str())
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => Ok(CasOutcome::Applied(row.try_into()?)),
        None => {
            // Lost the race between our read and the guarded write. Hand back the winner's row.
            let fresh = fetch_intent(id, conn).await?.ok_or_else(|| LedgerError::IntentNotFound(id.clone()))?;
            Ok(CasOutcome::Conflict(fresh))
        },
    }
}

/// Resolve a provider's transaction reference to the intent it belongs to, either via the intent row itself or
/// via any attempt that recorded the reference.
pub async fn intent_id_for_provider_reference(
    provider: &ProviderId,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<IntentId>, LedgerError> {
    let id: Option<String> = sqlx::query_scalar(
        "SELECT id FROM payment_intents WHERE chosen_provider = $1 AND provider_reference = $2",
    )
    .bind(provider.as_str())
    .bind(reference)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(id) = id {
        return Ok(Some(IntentId(id)));
    }
    let id: Option<String> = sqlx::query_scalar(
        "SELECT intent_id FROM provider_attempts WHERE provider = $1 AND provider_reference = $2 ORDER BY id \
         DESC LIMIT 1",
    )
    .bind(provider.as_str())
    .bind(reference)
    .fetch_optional(conn)
    .await?;
    Ok(id.map(IntentId))
}
