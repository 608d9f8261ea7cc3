pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod http;
pub mod interactive;
pub mod native;

#[cfg(test)]
mod stubs;
