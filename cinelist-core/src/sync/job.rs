use cinelist_model::CollectionId;

use crate::error::BackendError;

/// Lifecycle of one collection's sync job. Only `Pending` jobs are started,
/// so a collection never has two jobs in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub enum JobState {
    #[default]
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncJob {
    pub collection: CollectionId,
    pub attempt: u32,
    pub state: JobState,
    pub last_error: Option<BackendError>,
    /// Session generation the job last succeeded under.
    pub succeeded_generation: Option<u64>,
}

impl SyncJob {
    pub fn new(collection: CollectionId) -> Self {
        Self {
            collection,
            attempt: 0,
            state: JobState::Pending,
            last_error: None,
            succeeded_generation: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.state = JobState::InFlight;
        self.attempt += 1;
    }

    pub(crate) fn succeed(&mut self, generation: u64) {
        self.state = JobState::Succeeded;
        self.last_error = None;
        self.succeeded_generation = Some(generation);
    }

    pub(crate) fn fail(&mut self, error: BackendError) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
    }

    /// Back to `Pending` with the attempt counter intact.
    pub(crate) fn requeue(&mut self) {
        self.state = JobState::Pending;
    }

    /// Back to `Pending` for a user-initiated retry.
    pub(crate) fn reset(&mut self) {
        self.state = JobState::Pending;
        self.attempt = 0;
        self.last_error = None;
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.state == JobState::Succeeded
            && self.succeeded_generation == Some(generation)
    }
}

/// Derived view over every job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct SyncAggregate {
    pub all_succeeded: bool,
    pub any_failed: bool,
}

impl SyncAggregate {
    pub fn of<'a>(jobs: impl IntoIterator<Item = &'a SyncJob>) -> Self {
        let mut seen = false;
        let mut all_succeeded = true;
        let mut any_failed = false;
        for job in jobs {
            seen = true;
            all_succeeded &= job.state == JobState::Succeeded;
            any_failed |= job.state == JobState::Failed;
        }
        Self {
            all_succeeded: seen && all_succeeded,
            any_failed,
        }
    }
}
