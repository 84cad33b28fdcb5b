//! MongoDB plumbing shared by the record store and the GridFS blob store

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
