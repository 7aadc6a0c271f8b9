//! I/O helpers: resolvers, configuration and descriptor files.

pub mod config;
pub mod properties;
pub mod resolver;
