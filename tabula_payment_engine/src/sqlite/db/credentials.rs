use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use crate::{
    credentials::CredentialError,
    db_types::ProviderId,
    traits::SealedCredential,
};

#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    provider: String,
    sealed_material: Vec<u8>,
    token_expiry: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<CredentialRow> for SealedCredential {
    fn from(row: CredentialRow) -> Self {
        SealedCredential {
            provider: ProviderId::from(row.provider),
            sealed_material: row.sealed_material,
            token_expiry: row.token_expiry,
            updated_at: row.updated_at,
        }
    }
}

pub async fn fetch_credential(
    provider: &ProviderId,
    conn: &mut SqliteConnection,
) -> Result<Option<SealedCredential>, CredentialError> {
    let row: Option<CredentialRow> = sqlx::query_as("SELECT * FROM provider_credentials WHERE provider = $1")
        .bind(provider.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(SealedCredential::from))
}

pub async fn upsert_credential(
    credential: &SealedCredential,
    conn: &mut SqliteConnection,
) -> Result<(), CredentialError> {
    sqlx::query(
        r#"
            INSERT INTO provider_credentials (provider, sealed_material, token_expiry, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider) DO UPDATE SET
                sealed_material = excluded.sealed_material,
                token_expiry = excluded.token_expiry,
                updated_at = excluded.updated_at;
        "#,
    )
    .bind(credential.provider.as_str())
    .bind(&credential.sealed_material)
    .bind(credential.token_expiry)
    .bind(credential.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}
