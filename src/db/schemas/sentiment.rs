//! Sentiment document schema

use bson::{oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{recent_first, IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for sentiment records
pub const SENTIMENT_COLLECTION: &str = "sentiments";

/// Sentiment record stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SentimentDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Client-side capture time, stored as sent
    pub timestamp: String,

    /// Free-form sentiment payload
    #[serde(default)]
    pub data: Document,
}

impl IntoIndexes for SentimentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            recent_first(),
            Some(
                IndexOptions::builder()
                    .name("created_at_desc".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for SentimentDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
