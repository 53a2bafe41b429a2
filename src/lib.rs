pub mod core;
pub mod database;
pub mod notifications;
