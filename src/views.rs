//! Listing of recent telemetry for the `/data` page
//!
//! Gathers the most recent records of each kind and renders them as a plain
//! HTML page or as JSON. Vlogs come from the ordered `list` enumeration, so
//! only `limit` metadata records are ever read.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::Serialize;
use std::fmt::Write;

use crate::blob::{BlobId, BlobStore, ListOrder};
use crate::records::{GpsRecord, RecordStore, SentimentRecord};
use crate::types::Result;

/// One vlog line in the listing
#[derive(Debug, Clone, Serialize)]
pub struct VlogEntry {
    pub id: BlobId,
    pub filename: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Everything the listing page shows
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub sentiments: Vec<SentimentRecord>,
    pub gps_data: Vec<GpsRecord>,
    pub vlogs: Vec<VlogEntry>,
}

impl Listing {
    /// Collect up to `limit` newest entries per category
    pub async fn gather(
        records: &dyn RecordStore,
        blobs: &dyn BlobStore,
        limit: usize,
    ) -> Result<Self> {
        let sentiments = records.recent_sentiments(limit).await?;
        let gps_data = records.recent_gps(limit).await?;
        let vlogs = blobs
            .list(ListOrder::UploadedDesc, Some(limit))
            .await?
            .map_ok(|meta| VlogEntry {
                id: meta.id,
                filename: meta.name,
                size: meta.size,
                uploaded_at: meta.uploaded_at,
            })
            .try_collect()
            .await?;

        Ok(Self {
            sentiments,
            gps_data,
            vlogs,
        })
    }

    /// Render the listing as a standalone HTML page
    pub fn render_html(&self) -> String {
        let mut html = String::with_capacity(4096);
        html.push_str(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>EmoGo Data</title>\n</head>\n<body>\n<h1>EmoGo Data</h1>\n",
        );

        let _ = writeln!(html, "<h2>Sentiments ({})</h2>", self.sentiments.len());
        html.push_str("<table>\n<tr><th>Timestamp</th><th>Data</th></tr>\n");
        for s in &self.sentiments {
            let data = serde_json::Value::Object(s.data.clone()).to_string();
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape_html(&s.timestamp),
                escape_html(&data)
            );
        }
        html.push_str("</table>\n");

        let _ = writeln!(html, "<h2>GPS ({})</h2>", self.gps_data.len());
        html.push_str(
            "<table>\n<tr><th>Timestamp</th><th>Latitude</th><th>Longitude</th></tr>\n",
        );
        for g in &self.gps_data {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&g.timestamp),
                g.latitude,
                g.longitude
            );
        }
        html.push_str("</table>\n");

        let _ = writeln!(html, "<h2>Vlogs ({})</h2>", self.vlogs.len());
        html.push_str("<p><a href=\"/download/vlogs\">Download all</a></p>\n<ul>\n");
        for v in &self.vlogs {
            let _ = writeln!(
                html,
                "<li><a href=\"/download/vlog/{id}\">{name}</a> ({size} bytes, {at})</li>",
                id = v.id,
                name = escape_html(&v.filename),
                size = v.size,
                at = v.uploaded_at.to_rfc3339()
            );
        }
        html.push_str("</ul>\n</body>\n</html>\n");
        html
    }
}

/// Escape text for an HTML element or quoted attribute
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
