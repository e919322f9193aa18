pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigError, load_config, resolve_env_var};
pub use models::*;
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};
