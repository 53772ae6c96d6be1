//! Engine settings from the environment and declarative field rules.

pub mod settings;
pub mod types;

pub use settings::EngineConfig;
pub use types::ValidationRule;
