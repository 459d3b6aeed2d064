pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod session;
pub mod store;
