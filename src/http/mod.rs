pub mod client;
pub mod mappers;
pub mod models;
pub mod server;
