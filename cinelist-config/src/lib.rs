//! Configuration loading for Cinelist.
//!
//! Settings come from a TOML/JSON file, environment variables and an
//! optional `.env` file; see [`loader`] for the resolution order.

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{BackendConfig, ClientConfig, ConfigMetadata, ConfigSource};
pub use validation::{ConfigWarning, ConfigWarnings};
