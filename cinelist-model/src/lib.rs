//! Core data model definitions shared across Cinelist crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod error;
pub mod ids;
pub mod link;
pub mod list;
pub mod session;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use ids::{CollectionId, MovieId, UserId};
pub use link::RecoveryLink;
pub use list::ListItem;
pub use session::{AuthEvent, Session, SessionScope};
