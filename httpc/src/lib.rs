pub mod client;
pub mod config;
pub mod error;
pub mod redirect;
pub mod request;
pub mod response;
pub mod tcp;
pub mod udp;

pub use client::{parse_url, Client, Transport};
pub use config::ClientConfig;
pub use error::HttpcError;
pub use request::{format_get, format_post, Headers};
pub use response::Response;
