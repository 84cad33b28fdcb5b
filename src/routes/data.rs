//! Listing routes: `/data` (HTML) and `/api/data` (JSON)

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::error;

use crate::server::{error_response, json_response, to_boxed, AppState, ResponseBody};
use crate::types::Result;
use crate::views::Listing;

async fn gather(state: &AppState) -> Result<Listing> {
    Listing::gather(
        state.records.as_ref(),
        state.blobs.as_ref(),
        state.args.listing_limit,
    )
    .await
}

/// `GET /data`
pub async fn data_page(state: Arc<AppState>) -> Response<ResponseBody> {
    match gather(&state).await {
        Ok(listing) => to_boxed(
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/html; charset=utf-8")
                .body(Full::new(Bytes::from(listing.render_html())))
                .unwrap(),
        ),
        Err(e) => {
            error!(error = %e, "Failed to build data listing");
            to_boxed(error_response(&e))
        }
    }
}

/// `GET /api/data`
pub async fn data_json(state: Arc<AppState>) -> Response<ResponseBody> {
    let result = gather(&state)
        .await
        .and_then(|listing| Ok(serde_json::to_value(&listing)?));

    match result {
        Ok(body) => to_boxed(json_response(StatusCode::OK, &body)),
        Err(e) => {
            error!(error = %e, "Failed to build data listing");
            to_boxed(error_response(&e))
        }
    }
}
