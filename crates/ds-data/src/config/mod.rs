//! Studio configuration

pub mod null_handling;
pub mod studio_config;

pub use null_handling::*;
pub use studio_config::*;
