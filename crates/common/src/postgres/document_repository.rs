use crate::domain::{
    DocumentRepository, DomainError, DomainResult, InsertDocumentInput, InsertedDocument,
};
use crate::postgres::PostgresClient;
use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument};

/// Document store on PostgreSQL: one table per collection, each document a
/// JSONB value keyed by a generated id, deduplicated on the broker message id.
#[derive(Clone)]
pub struct PostgresDocumentRepository {
    client: PostgresClient,
    collection: String,
}

impl PostgresDocumentRepository {
    /// The collection name becomes a table name, so only lowercase ASCII
    /// letters, digits and underscores are accepted.
    pub fn new(client: PostgresClient, collection: impl Into<String>) -> anyhow::Result<Self> {
        let collection = collection.into();
        let valid = collection
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && collection
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            bail!("invalid collection name '{collection}'");
        }

        Ok(Self { client, collection })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection's table if it does not exist yet.
    pub async fn ensure_collection(&self) -> anyhow::Result<()> {
        info!(collection = %self.collection, "Ensuring collection exists");

        let conn = self.client.get_connection().await?;
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                msg_id TEXT UNIQUE,
                document JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            table = self.collection
        ))
        .await
        .with_context(|| format!("Failed to create collection {}", self.collection))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepository {
    #[instrument(skip(self, input), fields(collection = %self.collection, msg_id = ?input.msg_id))]
    async fn insert_one(&self, input: InsertDocumentInput) -> DomainResult<InsertedDocument> {
        let conn = self
            .client
            .get_connection()
            .await
            .map_err(DomainError::RepositoryError)?;

        let id = xid::new().to_string();
        let now = Utc::now();

        let inserted = conn
            .query_opt(
                &format!(
                    "INSERT INTO {} (id, msg_id, document, inserted_at)
                     VALUES ($1, $2, $3, $4)
                     ON CONFLICT (msg_id) DO NOTHING
                     RETURNING id",
                    self.collection
                ),
                &[&id, &input.msg_id, &input.document, &now],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        if let Some(row) = inserted {
            let id: String = row.get(0);
            debug!(document_id = %id, "Document inserted");
            return Ok(InsertedDocument {
                id,
                duplicate: false,
            });
        }

        // Only a msg_id conflict suppresses the insert
        let msg_id = input
            .msg_id
            .ok_or_else(|| DomainError::RepositoryError(anyhow!("insert returned no row")))?;

        let row = conn
            .query_one(
                &format!("SELECT id FROM {} WHERE msg_id = $1", self.collection),
                &[&msg_id],
            )
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        let id: String = row.get(0);
        info!(document_id = %id, msg_id = %msg_id, "Message already stored, skipping insert");

        Ok(InsertedDocument {
            id,
            duplicate: true,
        })
    }
}
