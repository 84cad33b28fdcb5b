//! Configuration for the EmoGo backend
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

use crate::transfer::DEFAULT_CHUNK_SIZE;

/// Largest accepted transfer chunk (64 MiB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// EmoGo backend - sentiment, GPS and vlog telemetry
#[derive(Parser, Debug, Clone)]
#[command(name = "emogo")]
#[command(about = "Telemetry ingestion and vlog export service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URL", default_value = "mongodb://localhost:27017")]
    pub mongodb_url: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "emogo_db")]
    pub mongodb_db: String,

    /// GridFS bucket holding vlog blobs
    #[arg(long, env = "GRIDFS_BUCKET", default_value = "fs")]
    pub gridfs_bucket: String,

    /// Enable development mode (in-memory stores if MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Maximum chunk size for downloads and archive output, in bytes
    #[arg(long, env = "CHUNK_SIZE_BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size_bytes: usize,

    /// Number of entries per category on the listing page
    #[arg(long, env = "LISTING_LIMIT", default_value = "100")]
    pub listing_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
            mongodb_url: "mongodb://localhost:27017".to_string(),
            mongodb_db: "emogo_db".to_string(),
            gridfs_bucket: "fs".to_string(),
            dev_mode: false,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            listing_limit: 100,
            log_level: "info".to_string(),
        }
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size_bytes == 0 {
            return Err("CHUNK_SIZE_BYTES must be greater than zero".to_string());
        }

        if self.chunk_size_bytes > MAX_CHUNK_SIZE {
            return Err(format!(
                "CHUNK_SIZE_BYTES must be at most {} bytes",
                MAX_CHUNK_SIZE
            ));
        }

        if self.listing_limit == 0 {
            return Err("LISTING_LIMIT must be greater than zero".to_string());
        }

        if self.gridfs_bucket.trim().is_empty() {
            return Err("GRIDFS_BUCKET must not be empty".to_string());
        }

        Ok(())
    }

    /// MongoDB URI with any `user:password@` part masked, for logging
    pub fn redacted_mongodb_url(&self) -> String {
        redact_credentials(&self.mongodb_url)
    }
}

/// Replace the userinfo of a connection URI with `***`
fn redact_credentials(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://").map(|i| i + 3) else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end..];
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***{}", &uri[..scheme_end], &rest[at..]),
        None => uri.to_string(),
    }
}
