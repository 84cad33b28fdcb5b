//! HTTP routes for EmoGo

pub mod data;
pub mod download;
pub mod health;
pub mod upload;

pub use data::{data_json, data_page};
pub use download::{download_all, download_blob, download_id};
pub use health::{health_check, root, HealthResponse};
pub use upload::{upload_gps, upload_sentiment, upload_vlog, FILE_FIELD};
