//! Merge of a remote collection with locally pending edits.
//!
//! Entries touched by a pending mutation take the local version; every other
//! entry takes the remote version. Entries that exist only locally and carry
//! no pending mutation are dropped, since the remote copy is authoritative
//! for them.

use cinelist_model::ListItem;

use super::store::Mutation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub items: Vec<ListItem>,
    /// The merged list differs from the remote one and must be pushed.
    pub diverged: bool,
}

pub fn reconcile(remote: &[ListItem], pending: &[Mutation]) -> Reconciled {
    let mut items = remote.to_vec();
    for mutation in pending {
        mutation.apply_to(&mut items);
    }
    let diverged = items != remote;
    Reconciled { items, diverged }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinelist_model::MovieId;

    fn item(id: u64, title: &str) -> ListItem {
        ListItem::new(id, title)
    }

    #[test]
    fn without_pending_edits_remote_wins() {
        let remote = vec![item(1, "Alien"), item(2, "Aliens")];
        let merged = reconcile(&remote, &[]);
        assert_eq!(merged.items, remote);
        assert!(!merged.diverged);
    }

    #[test]
    fn pending_edits_win_over_remote() {
        let remote = vec![item(1, "Alien"), item(2, "Aliens")];
        let mut renamed = remote[0].clone();
        renamed.title = "Alien (Director's Cut)".into();
        let pending = vec![
            Mutation::Upsert(renamed.clone()),
            Mutation::Remove(MovieId(2)),
            Mutation::Upsert(item(3, "Alien 3")),
        ];

        let merged = reconcile(&remote, &pending);
        assert!(merged.diverged);
        assert_eq!(merged.items.len(), 2);
        assert_eq!(merged.items[0], renamed);
        assert_eq!(merged.items[1].movie_id, MovieId(3));
    }

    #[test]
    fn removing_an_entry_the_remote_never_had_is_not_a_divergence() {
        let remote = vec![item(1, "Alien")];
        let merged = reconcile(&remote, &[Mutation::Remove(MovieId(9))]);
        assert!(!merged.diverged);
    }
}
