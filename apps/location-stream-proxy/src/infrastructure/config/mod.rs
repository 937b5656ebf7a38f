//! Configuration Module
//!
//! Configuration loading for the gateway service.

mod settings;

pub use settings::{
    ConfigError, CorsSettings, Credentials, ProxyConfig, ServerSettings, UpstreamSettings,
};
