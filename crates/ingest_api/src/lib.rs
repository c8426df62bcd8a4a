pub mod domain;
pub mod http;
pub mod ingest_api;
pub mod nats;

pub use domain::*;
pub use ingest_api::*;
