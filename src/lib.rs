// Core modules
pub mod broker;
pub mod config;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod models;
pub mod predictor;
pub mod scheduler;
pub mod strategy;

// Re-export commonly used types
pub use error::EngineError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, EngineError>;
