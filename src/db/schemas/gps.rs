//! GPS fix document schema

use bson::{oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{recent_first, IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for GPS fixes
pub const GPS_COLLECTION: &str = "gps";

/// GPS fix stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GpsDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl IntoIndexes for GpsDoc {
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

impl MutMetadata for GpsDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
