//! Domain layer for the streaming agent.

pub mod config;

pub use config::AgentConfig;
