//! Configuration and credential handling shared by the stores

pub mod config;
pub mod credentials;
