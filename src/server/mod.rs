//! HTTP server and shared application state

mod http;

pub use http::{
    error_response, handle_request, json_response, run, stream_body, to_boxed, AppState,
    ResponseBody,
};
