use std::collections::BTreeMap;

use crate::{
    engine::state::NotificationsState,
    models::{ConditionResult, Destination, Resource, annotations_patch},
    store::ResourceStore,
};

#[derive(Debug, Clone)]
struct Change {
    trigger: String,
    result: ConditionResult,
    destination: Destination,
    notified: bool,
}

/// The notification state of one resource during a reconcile pass.
///
/// The state starts from the cached resource. On the first change the
/// resource is read again from the store and the changes are replayed on top
/// of what is actually persisted, so a stale cache never causes a duplicate
/// notification.
pub(crate) struct StateTracker<'a> {
    store: &'a dyn ResourceStore,
    key: String,
    annotation: String,
    annotations: BTreeMap<String, String>,
    original: NotificationsState,
    state: NotificationsState,
    changes: Vec<Change>,
    refreshed: bool,
}

impl<'a> StateTracker<'a> {
    pub(crate) fn new(store: &'a dyn ResourceStore, resource: &Resource, annotation: &str) -> Self {
        let state = NotificationsState::from_persisted(resource.annotation(annotation));
        Self {
            store,
            key: resource.key(),
            annotation: annotation.to_string(),
            annotations: resource.annotations(),
            original: state.clone(),
            state,
            changes: Vec::new(),
            refreshed: false,
        }
    }

    /// Records or clears a notification, returning whether the state changed.
    pub(crate) async fn set_already_notified(
        &mut self,
        trigger: &str,
        result: &ConditionResult,
        destination: &Destination,
        notified: bool,
    ) -> bool {
        let change = Change {
            trigger: trigger.to_string(),
            result: result.clone(),
            destination: destination.clone(),
            notified,
        };
        let changed = self.apply(&change);
        self.changes.push(change);
        if !changed || self.refreshed {
            return changed;
        }

        self.refreshed = true;
        match self.store.get_fresh(&self.key).await {
            Ok(Some(fresh)) => {
                let persisted = NotificationsState::from_persisted(fresh.annotation(&self.annotation));
                if persisted == self.original {
                    return changed;
                }
                tracing::debug!(resource = %self.key, "Cached notification state is stale, replaying changes");
                self.annotations = fresh.annotations();
                self.original = persisted.clone();
                self.state = persisted;
                let changes = std::mem::take(&mut self.changes);
                let mut last = false;
                for change in &changes {
                    last = self.apply(change);
                }
                self.changes = changes;
                last
            }
            Ok(None) => changed,
            Err(e) => {
                tracing::warn!(resource = %self.key, error = %e, "Failed to refresh notification state");
                changed
            }
        }
    }

    fn apply(&mut self, change: &Change) -> bool {
        self.state.set_already_notified(
            &change.trigger,
            &change.result,
            &change.destination,
            change.notified,
        )
    }

    /// The merge patch persisting the state, `None` when nothing changed.
    pub(crate) fn into_patch(mut self, max_size: usize) -> Option<serde_json::Value> {
        self.state.truncate(max_size);
        if self.state == self.original {
            return None;
        }
        let mut updated = self.annotations.clone();
        if self.state.is_empty() {
            updated.remove(&self.annotation);
        } else {
            updated.insert(self.annotation.clone(), self.state.to_persisted());
        }
        annotations_patch(&self.annotations, &updated)
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}
