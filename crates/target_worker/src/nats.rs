mod target_consumer_service;

pub use target_consumer_service::*;
