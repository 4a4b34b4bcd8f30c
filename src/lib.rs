pub mod api_connection;
pub mod cli;
pub mod config;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod planning;
pub mod search;
pub mod store;
