//! Moderation list view.
//!
//! Renders the flattened pages of one queue, keeps the scroll trigger on the
//! last row, and routes approve/reject/delete actions to the queue service.
//! Nothing is updated optimistically: a successful action invalidates the
//! query and the list changes only once the refetch lands.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::QueueService;
use crate::error::QueueError;
use crate::model::{Decision, ModerationStatus, QueueItem};
use crate::scroll::{ScrollTrigger, TriggerGate};
use crate::store::{PageCacheStore, QueryKey, QueryState};

/// Sink for blocking, user-visible alerts.
pub trait Alerts: Send + Sync {
    fn alert(&self, message: &str);
}

/// Which row controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub approve: bool,
    pub reject: bool,
    pub delete: bool,
}

impl Controls {
    pub fn for_item<T: QueueItem>(item: &T) -> Self {
        let pending = item.status() == ModerationStatus::Pending;
        Self {
            approve: pending,
            reject: pending,
            delete: item.subject_post_id().is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Row<T> {
    pub item: T,
    pub controls: Controls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStatus {
    Loading,
    /// Loaded, nothing pending.
    Empty,
    /// The first page could not be loaded.
    LoadFailed,
    Ready,
}

#[derive(Debug, Clone)]
pub struct ListSnapshot<T> {
    pub rows: Vec<Row<T>>,
    pub status: ListStatus,
    pub has_next_page: bool,
    pub is_fetching_first: bool,
    pub is_fetching_next: bool,
    pub total_count: Option<u64>,
    /// One-based number of the highest loaded page.
    pub current_page: Option<u32>,
    pub error: Option<String>,
}

impl<T: QueueItem> ListSnapshot<T> {
    fn from_state(state: Option<&QueryState<T>>) -> Self {
        let Some(state) = state else {
            return Self {
                rows: Vec::new(),
                status: ListStatus::Loading,
                has_next_page: false,
                is_fetching_first: false,
                is_fetching_next: false,
                total_count: None,
                current_page: None,
                error: None,
            };
        };
        let rows: Vec<Row<T>> = state
            .items()
            .map(|item| Row {
                item: item.clone(),
                controls: Controls::for_item(item),
            })
            .collect();
        let status = if !rows.is_empty() {
            ListStatus::Ready
        } else if state.is_fetching_first {
            ListStatus::Loading
        } else if state.last_error.is_some() {
            ListStatus::LoadFailed
        } else {
            ListStatus::Empty
        };
        Self {
            rows,
            status,
            has_next_page: state.has_next_page(),
            is_fetching_first: state.is_fetching_first,
            is_fetching_next: state.is_fetching_next,
            total_count: state.total_count(),
            current_page: state.pages.last().map(|p| p.display_number()),
            error: state.last_error.clone(),
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.item.id()).collect()
    }

    pub fn row(&self, id: i64) -> Option<&Row<T>> {
        self.rows.iter().find(|r| r.item.id() == id)
    }
}

/// Result of a moderation action.
#[derive(Debug)]
pub enum ActionOutcome {
    /// The backend accepted the change and the query was invalidated.
    Applied,
    /// The control is disabled for this row; nothing was sent.
    Blocked,
    /// The backend refused or could not be reached; an alert was raised.
    Failed(QueueError),
}

impl ActionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied)
    }
}

#[derive(Debug, Clone, Copy)]
enum Action {
    Decide(Decision),
    DeletePost,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::Decide(Decision::Approved) => "approve",
            Action::Decide(Decision::Rejected) => "reject",
            Action::DeletePost => "delete post",
        }
    }
}

pub struct ModerationView<S: QueueService> {
    store: Arc<PageCacheStore<S>>,
    key: QueryKey,
    trigger: ScrollTrigger<i64>,
    load_more_tx: mpsc::UnboundedSender<()>,
    load_more_rx: mpsc::UnboundedReceiver<()>,
    alerts: Arc<dyn Alerts>,
}

impl<S: QueueService> ModerationView<S> {
    pub fn new(store: Arc<PageCacheStore<S>>, key: QueryKey, alerts: Arc<dyn Alerts>) -> Self {
        let (load_more_tx, load_more_rx) = mpsc::unbounded_channel();
        Self {
            store,
            key,
            trigger: ScrollTrigger::new(),
            load_more_tx,
            load_more_rx,
            alerts,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Last row currently watched by the scroll trigger.
    pub fn observed_row(&self) -> Option<i64> {
        self.trigger.observed().copied()
    }

    /// Load (or reuse) the first page and render.
    pub async fn mount(&mut self) -> ListSnapshot<S::Item> {
        if let Err(err) = self.store.get_or_fetch(&self.key).await {
            warn!(key = %self.key, ?err, "initial load failed");
        }
        self.render().await
    }

    /// Snapshot the cached rows and keep the trigger on the last one.
    pub async fn render(&mut self) -> ListSnapshot<S::Item> {
        let state = self.store.state(&self.key).await;
        let snapshot = ListSnapshot::from_state(state.as_ref());

        match snapshot.rows.last().map(|r| r.item.id()) {
            Some(last) if self.trigger.observed() != Some(&last) => {
                let tx = self.load_more_tx.clone();
                self.trigger.attach(last, move || {
                    let _ = tx.send(());
                });
            }
            Some(_) => {}
            None => self.trigger.detach(),
        }
        snapshot
    }

    /// Viewport callback for the row `item_id`. Returns true if a next page
    /// was requested. A failed next page leaves the list as it was.
    pub async fn on_visibility(&mut self, item_id: i64, intersecting: bool) -> bool {
        let gate = match self.store.state(&self.key).await {
            Some(state) => TriggerGate {
                has_next_page: state.has_next_page(),
                is_fetching_next: state.is_fetching_next,
            },
            None => TriggerGate {
                has_next_page: false,
                is_fetching_next: false,
            },
        };
        self.trigger.notify(&item_id, intersecting, gate);

        let mut requested = false;
        while self.load_more_rx.try_recv().is_ok() {
            requested = true;
            if let Err(err) = self.store.fetch_next(&self.key).await {
                warn!(key = %self.key, ?err, "next page failed; scroll will not advance");
            }
        }
        requested
    }

    pub async fn approve(&mut self, id: i64) -> ActionOutcome {
        self.run(id, Action::Decide(Decision::Approved)).await
    }

    pub async fn reject(&mut self, id: i64) -> ActionOutcome {
        self.run(id, Action::Decide(Decision::Rejected)).await
    }

    /// Delete the post behind row `id`.
    pub async fn delete(&mut self, id: i64) -> ActionOutcome {
        self.run(id, Action::DeletePost).await
    }

    async fn run(&mut self, id: i64, action: Action) -> ActionOutcome {
        let item = match self.store.state(&self.key).await {
            Some(state) => state.items().find(|item| item.id() == id).cloned(),
            None => None,
        };
        let Some(item) = item else {
            debug!(id, action = action.label(), "action on unknown row ignored");
            return ActionOutcome::Blocked;
        };
        let controls = Controls::for_item(&item);

        let service = self.store.service().clone();
        let result = match action {
            Action::Decide(decision) => {
                let enabled = match decision {
                    Decision::Approved => controls.approve,
                    Decision::Rejected => controls.reject,
                };
                if !enabled {
                    debug!(id, status = item.status().as_str(), "status control disabled");
                    return ActionOutcome::Blocked;
                }
                service.mutate_status(id, decision).await
            }
            Action::DeletePost => match item.subject_post_id() {
                Some(post_id) => service.delete_subject_post(post_id).await,
                None => {
                    debug!(id, "row has no post to delete");
                    return ActionOutcome::Blocked;
                }
            },
        };

        match result {
            Ok(()) => {
                info!(id, action = action.label(), key = %self.key, "action applied; refreshing");
                if let Err(err) = self.store.invalidate(&self.key).await {
                    warn!(key = %self.key, ?err, "refetch after action failed");
                }
                ActionOutcome::Applied
            }
            Err(err) => {
                warn!(id, action = action.label(), ?err, "action failed");
                self.alerts
                    .alert(&format!("Failed to {} item {}: {}", action.label(), id, err));
                ActionOutcome::Failed(err)
            }
        }
    }

    /// Tear down: release the trigger and drop the cached query.
    pub async fn unmount(&mut self) {
        self.trigger.detach();
        while self.load_more_rx.try_recv().is_ok() {}
        self.store.evict(&self.key).await;
    }
}
