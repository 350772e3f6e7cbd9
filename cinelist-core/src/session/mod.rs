//! Session resolution and password recovery.

mod password;
mod reducer;
mod resolver;
mod state;

pub use password::{LoginRedirect, validate_email, validate_new_password};
pub use reducer::{Evidence, EvidenceChannel, reduce};
pub use resolver::SessionResolver;
pub use state::{SessionState, SessionStatus};
