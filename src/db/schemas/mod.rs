//! Database schemas for EmoGo
//!
//! MongoDB document structures for the structured telemetry records.
//! Vlog blobs live in GridFS and have no schema here.

mod gps;
mod metadata;
mod sentiment;

pub use gps::{GpsDoc, GPS_COLLECTION};
pub use metadata::Metadata;
pub use sentiment::{SentimentDoc, SENTIMENT_COLLECTION};
