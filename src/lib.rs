pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod mcp;
pub mod quota;
pub mod server;
pub mod tools;
pub mod twitter;
pub mod types;
