//! EmoGo - telemetry backend for the EmoGo mobile app
//!
//! Ingests three kinds of data from the client: sentiment samples, GPS
//! fixes and short vlog videos. Records live in MongoDB collections, vlogs
//! in a GridFS bucket.
//!
//! ## Components
//!
//! - **Blob store** (`blob`): write-once binary objects with metadata,
//!   streaming reads, ordered listing and unordered scans
//! - **Transfer** (`transfer`): one blob as a pull-driven chunk stream
//! - **Archive** (`archive`): every blob as one streamed ZIP file
//! - **Records / views**: sentiment and GPS documents, and the `/data` listing
//! - **Server**: hyper http1 front end wiring the above to HTTP routes

pub mod archive;
pub mod blob;
pub mod config;
pub mod db;
pub mod records;
pub mod routes;
pub mod server;
pub mod transfer;
pub mod types;
pub mod views;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{EmogoError, Result};
