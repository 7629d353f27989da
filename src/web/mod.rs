//! JSON surface for the browser graph widget.

pub mod http;
pub mod types;

pub use http::{HttpServer, ViewerState};
