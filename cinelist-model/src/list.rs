use chrono::{DateTime, Utc};

use crate::ids::MovieId;

/// One movie entry in a user's list.
///
/// `updated_at` is bumped on every local edit and is what the sync layer
/// uses to tell a locally modified entry from one that only mirrors the
/// remote copy.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListItem {
    pub movie_id: MovieId,
    pub title: String,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub poster_path: Option<String>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub release_date: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListItem {
    pub fn new(movie_id: impl Into<MovieId>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            movie_id: movie_id.into(),
            title: title.into(),
            poster_path: None,
            release_date: None,
            added_at: now,
            updated_at: now,
        }
    }

    pub fn with_poster(mut self, poster_path: impl Into<String>) -> Self {
        self.poster_path = Some(poster_path.into());
        self
    }

    pub fn with_release_date(mut self, release_date: impl Into<String>) -> Self {
        self.release_date = Some(release_date.into());
        self
    }

    /// Mark the entry as edited now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
