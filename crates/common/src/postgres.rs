mod client;
mod document_repository;

pub use client::*;
pub use document_repository::*;
