mod point_ingestion_service;

pub use point_ingestion_service::*;
