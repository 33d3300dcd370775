pub mod config;
pub mod diagnostics;
pub mod error;
pub mod pip_document;
pub mod session_counter_repository;
pub mod session_log_client;
pub mod surface;
