//! MongoDB client and collection wrapper
//!
//! One `MongoClient` is created at startup and cloned into every component
//! that needs it (record collections, the GridFS bucket).

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{ClientOptions, IndexOptions},
    Client, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::EmogoError;

/// Server selection and connect timeout, so an unreachable cluster fails fast
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Sort key for "most recent first" reads; record schemas index the same key
pub fn recent_first() -> Document {
    doc! { "metadata.created_at": -1, "_id": -1 }
}

/// Parse a connection URI and apply the startup timeouts
pub async fn client_options(uri: &str) -> Result<ClientOptions, EmogoError> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(|e| EmogoError::StorageUnavailable(format!("Invalid MongoDB URI: {}", e)))?;
    options.server_selection_timeout = Some(CONNECT_TIMEOUT);
    options.connect_timeout = Some(CONNECT_TIMEOUT);
    Ok(options)
}

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the server answers a ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, EmogoError> {
        info!("Connecting to MongoDB database '{}'", db_name);

        let options = client_options(uri).await?;
        let client = Client::with_options(options).map_err(|e| {
            EmogoError::StorageUnavailable(format!("Failed to connect to MongoDB: {}", e))
        })?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| EmogoError::StorageUnavailable(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, EmogoError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.db_name)
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection handle and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, EmogoError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), EmogoError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| EmogoError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping its creation time
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, EmogoError> {
        item.mut_metadata().created_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| EmogoError::StorageUnavailable(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| EmogoError::Database("Failed to get inserted ID".into()))
    }

    /// Most recent documents first, by server insertion time
    pub async fn find_recent(&self, limit: usize) -> Result<Vec<T>, EmogoError> {
        let cursor = self
            .inner
            .find(doc! {})
            .sort(recent_first())
            .limit(limit.min(i64::MAX as usize) as i64)
            .await
            .map_err(|e| EmogoError::StorageUnavailable(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| EmogoError::Database(format!("Cursor failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{GpsDoc, SentimentDoc};

    #[tokio::test]
    async fn test_client_options_keep_database_path() {
        // Parsing a plain host list does not touch the network
        let options = client_options("mongodb://127.0.0.1:1/emogo_db").await.unwrap();
        assert_eq!(options.default_database.as_deref(), Some("emogo_db"));
        assert_eq!(options.server_selection_timeout, Some(CONNECT_TIMEOUT));
        assert_eq!(options.connect_timeout, Some(CONNECT_TIMEOUT));

        let options = client_options("mongodb://127.0.0.1:1/emogo_db?appName=emogo")
            .await
            .unwrap();
        assert_eq!(options.default_database.as_deref(), Some("emogo_db"));
        assert_eq!(options.app_name.as_deref(), Some("emogo"));
        assert_eq!(options.server_selection_timeout, Some(CONNECT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_client_options_reject_garbage() {
        let err = client_options("not a uri").await.unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_record_indexes_cover_recent_sort() {
        let sentiment: Vec<Document> = SentimentDoc::into_indices()
            .into_iter()
            .map(|(keys, _)| keys)
            .collect();
        let gps: Vec<Document> = GpsDoc::into_indices()
            .into_iter()
            .map(|(keys, _)| keys)
            .collect();
        assert!(sentiment.contains(&recent_first()));
        assert!(gps.contains(&recent_first()));
    }
}
