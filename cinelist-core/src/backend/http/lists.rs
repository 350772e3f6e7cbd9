use async_trait::async_trait;
use cinelist_model::{CollectionId, ListItem, Session};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{RestClient, SessionHandle};
use crate::backend::{BackendResult, ListStore};
use crate::error::BackendError;

const TABLE: &str = "rest/v1/list_items";
const CONFLICT_KEY: &str = "user_id,list,movie_id";

/// One row of the `list_items` table.
#[derive(Debug, Serialize, Deserialize)]
struct ListItemRow {
    user_id: Uuid,
    list: String,
    #[serde(flatten)]
    item: ListItem,
}

/// List storage backed by a REST table keyed by `(user_id, list, movie_id)`.
#[derive(Debug, Clone)]
pub struct HttpListStore {
    rest: RestClient,
    session: SessionHandle,
}

impl HttpListStore {
    pub fn new(rest: RestClient, session: SessionHandle) -> Self {
        Self { rest, session }
    }

    fn session(&self) -> BackendResult<Session> {
        self.session.read().clone().ok_or(BackendError::NoSession)
    }

    fn filters(
        session: &Session,
        collection: &CollectionId,
    ) -> [(String, String); 2] {
        [
            ("user_id".to_string(), format!("eq.{}", session.user_id)),
            ("list".to_string(), format!("eq.{}", collection)),
        ]
    }
}

#[async_trait]
impl ListStore for HttpListStore {
    #[instrument(skip(self), fields(collection = %collection))]
    async fn fetch_list(
        &self,
        collection: &CollectionId,
    ) -> BackendResult<Vec<ListItem>> {
        let session = self.session()?;
        let request = self
            .rest
            .authorize(self.rest.get(TABLE), Some(&session))
            .query(&Self::filters(&session, collection))
            .query(&[("select", "*"), ("order", "added_at.asc")]);
        let rows: Vec<ListItemRow> = self.rest.execute_json(request).await?;
        debug!(rows = rows.len(), "fetched remote list");
        Ok(rows.into_iter().map(|row| row.item).collect())
    }

    /// Upserts `items`, then deletes the remote rows not among them. A
    /// failure part way leaves a superset of `items` on the remote, never
    /// less.
    #[instrument(
        skip(self, items),
        fields(collection = %collection, items = items.len())
    )]
    async fn push_list(
        &self,
        collection: &CollectionId,
        items: &[ListItem],
    ) -> BackendResult<()> {
        let session = self.session()?;

        if !items.is_empty() {
            let rows: Vec<ListItemRow> = items
                .iter()
                .cloned()
                .map(|item| ListItemRow {
                    user_id: session.user_id.to_uuid(),
                    list: collection.to_string(),
                    item,
                })
                .collect();
            let upsert = self
                .rest
                .authorize(self.rest.post(TABLE), Some(&session))
                .query(&[("on_conflict", CONFLICT_KEY)])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&rows);
            self.rest.execute_empty(upsert).await?;
        }

        let mut prune = self
            .rest
            .authorize(self.rest.delete(TABLE), Some(&session))
            .query(&Self::filters(&session, collection));
        if let Some(kept) = kept_filter(items) {
            prune = prune.query(&[("movie_id", kept)]);
        }
        self.rest.execute_empty(prune).await?;
        debug!("remote list replaced");
        Ok(())
    }
}

/// PostgREST filter matching rows whose movie is not in `items`.
fn kept_filter(items: &[ListItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let ids = items
        .iter()
        .map(|item| item.movie_id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    Some(format!("not.in.({ids})"))
}
