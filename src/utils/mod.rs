//! Logging, validation and id helpers.

pub mod ids;
pub mod logging;
pub mod validation;

pub use ids::{generate_id, new_message_id};
pub use logging::LoggingConfig;
pub use validation::ConfigValidator;
