use sqlx::{postgres::PgPoolOptions, types::Json, PgConnection, PgPool};
use tokio::sync::broadcast;

use super::store::{
    CommitReceipt, DocumentChange, GameStore, LibrarySnapshot, SnapshotHub, UserDocuments,
    WriteBatch,
};
use crate::{
    error::{AppError, AppResult},
    models::{ImportNotification, UserId, UserProfile},
};

const KIND_GAME: &str = "game";
const KIND_CHALLENGE: &str = "challenge";
const KIND_PROFILE: &str = "profile";
const KIND_IMPORT: &str = "import";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed document store.
///
/// All documents live in one JSONB table keyed by `(user_id, kind, doc_id)`.
/// A commit takes a per-user advisory lock, replays the batch against the
/// loaded documents and writes the resulting changes in the same transaction.
pub struct PgStore {
    pool: PgPool,
    hub: SnapshotHub,
}

impl PgStore {
    /// Wraps `pool` after running pending migrations
    pub async fn new(pool: PgPool) -> anyhow::Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            hub: SnapshotHub::new(),
        })
    }

    async fn load(conn: &mut PgConnection, user: &UserId) -> AppResult<UserDocuments> {
        let rows: Vec<(String, Json<serde_json::Value>)> = sqlx::query_as(
            r#"
            SELECT kind, body
            FROM documents
            WHERE user_id = $1
            ORDER BY seq
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut docs = UserDocuments::default();
        for (kind, Json(body)) in rows {
            match kind.as_str() {
                KIND_GAME => docs.games.push(decode(body)?),
                KIND_CHALLENGE => docs.challenges.push(decode(body)?),
                KIND_PROFILE => docs.profile = decode(body)?,
                KIND_IMPORT => docs.import_status = Some(decode(body)?),
                other => tracing::warn!(user = %user, kind = other, "Skipping unknown document kind"),
            }
        }
        Ok(docs)
    }

    async fn load_from_pool(&self, user: &UserId) -> AppResult<UserDocuments> {
        let mut conn = self.pool.acquire().await?;
        Self::load(&mut *conn, user).await
    }

    async fn write_change(
        conn: &mut PgConnection,
        user: &UserId,
        change: &DocumentChange,
    ) -> Result<(), sqlx::Error> {
        let (kind, doc_id, body) = match change {
            DocumentChange::DeleteGame(id) => {
                sqlx::query("DELETE FROM documents WHERE user_id = $1 AND kind = $2 AND doc_id = $3")
                    .bind(user.as_str())
                    .bind(KIND_GAME)
                    .bind(id.as_str())
                    .execute(&mut *conn)
                    .await?;
                return Ok(());
            }
            DocumentChange::PutGame(game) => {
                (KIND_GAME, game.id.to_string(), serde_json::to_value(game))
            }
            DocumentChange::PutChallenge(challenge) => (
                KIND_CHALLENGE,
                challenge.id.to_string(),
                serde_json::to_value(challenge),
            ),
            DocumentChange::PutProfile(profile) => {
                (KIND_PROFILE, KIND_PROFILE.to_string(), serde_json::to_value(profile))
            }
            DocumentChange::PutImportStatus(status) => {
                (KIND_IMPORT, KIND_IMPORT.to_string(), serde_json::to_value(status))
            }
        };
        let body = body.map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        sqlx::query(
            r#"
            INSERT INTO documents (user_id, kind, doc_id, body)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, kind, doc_id)
            DO UPDATE SET body = EXCLUDED.body, updated_at = now()
            "#,
        )
        .bind(user.as_str())
        .bind(kind)
        .bind(doc_id)
        .bind(Json(body))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: serde_json::Value) -> AppResult<T> {
    serde_json::from_value(body)
        .map_err(|e| AppError::Internal(format!("Corrupt document: {}", e)))
}

#[async_trait::async_trait]
impl GameStore for PgStore {
    async fn snapshot(&self, user: &UserId) -> AppResult<LibrarySnapshot> {
        Ok(self.load_from_pool(user).await?.snapshot())
    }

    async fn profile(&self, user: &UserId) -> AppResult<UserProfile> {
        Ok(self.load_from_pool(user).await?.profile)
    }

    async fn import_status(&self, user: &UserId) -> AppResult<Option<ImportNotification>> {
        let row: Option<(Json<ImportNotification>,)> = sqlx::query_as(
            "SELECT body FROM documents WHERE user_id = $1 AND kind = $2 AND doc_id = $2",
        )
        .bind(user.as_str())
        .bind(KIND_IMPORT)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(status),)| status))
    }

    async fn commit(&self, user: &UserId, batch: WriteBatch) -> AppResult<CommitReceipt> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await?;

        let mut docs = Self::load(&mut *tx, user).await?;
        let (receipt, changes) = docs.apply(batch)?;

        for change in &changes {
            Self::write_change(&mut *tx, user, change)
                .await
                .map_err(|e| AppError::TransactionalWrite(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| AppError::TransactionalWrite(e.to_string()))?;

        if changes.iter().any(DocumentChange::touches_library) {
            self.hub.publish(user, docs.snapshot());
        }

        tracing::debug!(user = %user, changes = changes.len(), "Committed batch");
        Ok(receipt)
    }

    fn subscribe(&self, user: &UserId) -> broadcast::Receiver<LibrarySnapshot> {
        self.hub.subscribe(user)
    }
}
