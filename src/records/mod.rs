//! Structured telemetry records (sentiment, GPS)
//!
//! Small JSON documents inserted one at a time and listed newest-first.
//! There is no streaming or chunking here; the store is a thin layer over a
//! document collection.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::db::schemas::{GpsDoc, Metadata, SentimentDoc, GPS_COLLECTION, SENTIMENT_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{EmogoError, Result};

/// Sentiment sample as posted by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub timestamp: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// GPS fix as posted by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsRecord {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Record persistence (MongoDB in production, in-memory for tests)
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_sentiment(&self, record: SentimentRecord) -> Result<()>;

    async fn insert_gps(&self, record: GpsRecord) -> Result<()>;

    /// Newest first, at most `limit`
    async fn recent_sentiments(&self, limit: usize) -> Result<Vec<SentimentRecord>>;

    /// Newest first, at most `limit`
    async fn recent_gps(&self, limit: usize) -> Result<Vec<GpsRecord>>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

/// MongoDB-backed record store
pub struct MongoRecordStore {
    sentiments: MongoCollection<SentimentDoc>,
    gps: MongoCollection<GpsDoc>,
}

impl MongoRecordStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            sentiments: mongo.collection(SENTIMENT_COLLECTION).await?,
            gps: mongo.collection(GPS_COLLECTION).await?,
        })
    }
}

impl TryFrom<SentimentRecord> for SentimentDoc {
    type Error = EmogoError;

    fn try_from(record: SentimentRecord) -> Result<Self> {
        let data = bson::to_document(&record.data)
            .map_err(|e| EmogoError::InvalidPayload(format!("sentiment data: {}", e)))?;
        Ok(SentimentDoc {
            _id: None,
            metadata: Metadata::new(),
            timestamp: record.timestamp,
            data,
        })
    }
}

impl TryFrom<SentimentDoc> for SentimentRecord {
    type Error = EmogoError;

    fn try_from(doc: SentimentDoc) -> Result<Self> {
        let data = match serde_json::to_value(&doc.data)? {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(EmogoError::Database(format!(
                    "sentiment data is not an object: {}",
                    other
                )))
            }
        };
        Ok(SentimentRecord {
            timestamp: doc.timestamp,
            data,
        })
    }
}

impl From<GpsRecord> for GpsDoc {
    fn from(record: GpsRecord) -> Self {
        GpsDoc {
            _id: None,
            metadata: Metadata::new(),
            timestamp: record.timestamp,
            latitude: record.latitude,
            longitude: record.longitude,
        }
    }
}

impl From<GpsDoc> for GpsRecord {
    fn from(doc: GpsDoc) -> Self {
        GpsRecord {
            timestamp: doc.timestamp,
            latitude: doc.latitude,
            longitude: doc.longitude,
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for MongoRecordStore {
    async fn insert_sentiment(&self, record: SentimentRecord) -> Result<()> {
        self.sentiments.insert_one(record.try_into()?).await?;
        Ok(())
    }

    async fn insert_gps(&self, record: GpsRecord) -> Result<()> {
        self.gps.insert_one(record.into()).await?;
        Ok(())
    }

    async fn recent_sentiments(&self, limit: usize) -> Result<Vec<SentimentRecord>> {
        self.sentiments
            .find_recent(limit)
            .await?
            .into_iter()
            .map(SentimentRecord::try_from)
            .collect()
    }

    async fn recent_gps(&self, limit: usize) -> Result<Vec<GpsRecord>> {
        Ok(self
            .gps
            .find_recent(limit)
            .await?
            .into_iter()
            .map(GpsRecord::from)
            .collect())
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Simple in-memory record store
#[derive(Default)]
pub struct MemoryRecordStore {
    sentiments: Arc<RwLock<Vec<SentimentRecord>>>,
    gps: Arc<RwLock<Vec<GpsRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    items.iter().rev().take(limit).cloned().collect()
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_sentiment(&self, record: SentimentRecord) -> Result<()> {
        self.sentiments.write().await.push(record);
        Ok(())
    }

    async fn insert_gps(&self, record: GpsRecord) -> Result<()> {
        self.gps.write().await.push(record);
        Ok(())
    }

    async fn recent_sentiments(&self, limit: usize) -> Result<Vec<SentimentRecord>> {
        Ok(newest_first(&self.sentiments.read().await, limit))
    }

    async fn recent_gps(&self, limit: usize) -> Result<Vec<GpsRecord>> {
        Ok(newest_first(&self.gps.read().await, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sentiment(ts: &str) -> SentimentRecord {
        serde_json::from_value(json!({ "timestamp": ts, "data": { "mood": 3 } })).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_newest_first() {
        let store = MemoryRecordStore::new();
        for i in 0..5 {
            store.insert_sentiment(sentiment(&format!("t{i}"))).await.unwrap();
        }

        let recent = store.recent_sentiments(3).await.unwrap();
        let stamps: Vec<_> = recent.iter().map(|r| r.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["t4", "t3", "t2"]);
    }

    #[tokio::test]
    async fn test_memory_store_gps() {
        let store = MemoryRecordStore::new();
        store
            .insert_gps(GpsRecord {
                timestamp: "2024-01-01T00:00:00Z".into(),
                latitude: 25.03,
                longitude: 121.56,
            })
            .await
            .unwrap();

        let recent = store.recent_gps(100).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].latitude, 25.03);
    }

    #[test]
    fn test_sentiment_doc_conversion() {
        let record = sentiment("t0");
        let doc = SentimentDoc::try_from(record.clone()).unwrap();
        assert_eq!(doc.data.get_i64("mood").unwrap(), 3);

        let back = SentimentRecord::try_from(doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_gps_shape_is_checked() {
        let bad = serde_json::from_value::<GpsRecord>(json!({
            "timestamp": "t", "latitude": "north", "longitude": 1.0
        }));
        assert!(bad.is_err());
    }
}
