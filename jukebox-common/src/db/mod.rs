//! Database models and queries

pub mod bluetooth;
pub mod init;
pub mod models;
pub mod queue;
pub mod schedules;
pub mod settings;
pub mod speakers;

pub use init::init_database;
pub use models::*;
