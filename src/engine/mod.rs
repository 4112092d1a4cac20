// Restage engine - core module structure
pub mod api;
pub mod cli;
pub mod config;
pub mod download;
pub mod resolver;
pub mod stager;

pub use config::Config;
pub use stager::Stager;

/// Client identity sent with every outbound HTTP request.
pub const USER_AGENT: &str = concat!("restage/", env!("CARGO_PKG_VERSION"));
