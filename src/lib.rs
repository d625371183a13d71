pub mod analysis;
pub mod config;
pub mod server;
