pub mod collaboration;
pub mod config;
pub mod database;
pub mod errors;
pub mod scene;
pub mod server;
pub mod services;
pub mod store;
