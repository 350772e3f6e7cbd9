//! Collection synchronization.
//!
//! Each registered collection gets one [`SyncJob`] per pass. Jobs fetch the
//! remote list, [`reconcile`] it with locally pending edits, push the merge
//! back when it diverged and commit it to the local [`CollectionStore`].

mod job;
mod orchestrator;
mod reconcile;
mod store;

pub use job::{JobState, SyncAggregate, SyncJob};
pub use orchestrator::{SessionRejectedHook, SyncOrchestrator, SyncStatus};
pub use reconcile::{Reconciled, reconcile};
pub use store::{CollectionStore, Mutation};
