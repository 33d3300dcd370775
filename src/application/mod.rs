pub mod bootstrap;
pub mod commands;
pub mod focus_session;
pub mod runtime;
pub mod settings;
pub mod sync_bridge;
