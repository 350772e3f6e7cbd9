//! # Cinelist Core
//!
//! Session resolution and list synchronization for the Cinelist watchlist
//! client.
//!
//! - [`session`]: merges evidence from recovery links, session polls and
//!   pushed auth events into one authoritative [`SessionState`], and drives
//!   the password-recovery flow.
//! - [`sync`]: one job per collection, reconciling the remote list with
//!   locally pending edits.
//! - [`readiness`]: debounced "ready" signal over the loading flags.
//! - [`backend`]: the auth and list-storage contracts plus HTTP adapters.
//!
//! [`CinelistClient`] wires all of them together.
//!
//! ## Feature Flags
//!
//! - `testing`: in-memory backends for tests and demos.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod readiness;
pub mod session;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

pub use client::{CinelistClient, CinelistClientBuilder};
pub use config::{CoreConfig, ReadinessConfig, SessionConfig, SyncConfig};
pub use error::{
    BackendError, CollectionFailure, PasswordResetError, Remediation,
    SessionError, SyncError,
};
pub use session::{
    LoginRedirect, SessionResolver, SessionState, SessionStatus,
};
pub use sync::{CollectionStore, SyncOrchestrator, SyncStatus};

pub use cinelist_model as model;
