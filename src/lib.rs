pub mod app;
pub mod browser;
pub mod clinical;
pub mod config;
pub mod discovery;
pub mod document_store;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod matrix;
pub mod object_store;
pub mod output;
pub mod query;
pub mod server;
pub mod sync;
