mod client;
mod request;

pub use client::create_client;
pub use request::{CapturedResponse, Exchange, build_request, execute_request};
