//! Typed notifications raised by a data source.
//!
//! Listeners run synchronously on the owning task, in subscription order.
//! A load or page change raises its notifications in a fixed order:
//! property changes first, then [`DataSourceEvent::LoadedData`], then
//! [`DataSourceEvent::PageChanged`].

use crate::error::ExecutorError;
use crate::executor::QueryRequest;
use dataview_model::EntityKey;
use tokio::sync::mpsc;

/// Observable properties of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewProperty {
    Count,
    TotalItemCount,
    PageIndex,
    PageSize,
    CurrentItem,
    CurrentPosition,
    IsBusy,
    IsLoadingData,
    IsSubmittingChanges,
    CanLoad,
    HasChanges,
    IsAddingNew,
    IsEditingItem,
    Groups,
}

/// How the view's item list changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionChange {
    /// The list was replaced.
    Reset,
    Added { key: EntityKey, index: usize },
    Removed { key: EntityKey, index: usize },
}

/// Raised before a query is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingDataEvent {
    pub generation: u64,
    pub request: QueryRequest,
    /// Chunk number of a progressive load.
    pub chunk: Option<usize>,
    cancel: bool,
}

impl LoadingDataEvent {
    pub(crate) fn new(generation: u64, request: QueryRequest, chunk: Option<usize>) -> Self {
        Self {
            generation,
            request,
            chunk,
            cancel: false,
        }
    }

    /// Aborts the load before it reaches the executor.
    pub fn cancel(&mut self) {
        self.cancel = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
    }
}

/// Raised when a load completes, fails or is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataEvent {
    pub generation: u64,
    pub cancelled: bool,
    pub error: Option<ExecutorError>,
    /// Items in the view after the load.
    pub count: usize,
    pub total_item_count: Option<usize>,
    /// More progressive chunks follow.
    pub has_more: bool,
    handled: bool,
}

impl LoadedDataEvent {
    pub(crate) fn completed(
        generation: u64,
        count: usize,
        total_item_count: Option<usize>,
        has_more: bool,
    ) -> Self {
        Self {
            generation,
            cancelled: false,
            error: None,
            count,
            total_item_count,
            has_more,
            handled: false,
        }
    }

    pub(crate) fn cancelled(generation: u64) -> Self {
        Self {
            cancelled: true,
            ..Self::completed(generation, 0, None, false)
        }
    }

    pub(crate) fn failed(generation: u64, error: ExecutorError) -> Self {
        Self {
            error: Some(error),
            ..Self::completed(generation, 0, None, false)
        }
    }

    /// Marks the error as dealt with so it is not returned to the caller.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

/// Raised before a change set is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittingChangesEvent {
    pub generation: u64,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// Raised when a submit completes, fails or is cancelled.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedChangesEvent {
    pub generation: u64,
    pub cancelled: bool,
    pub error: Option<ExecutorError>,
    handled: bool,
}

impl SubmittedChangesEvent {
    pub(crate) fn completed(generation: u64) -> Self {
        Self {
            generation,
            cancelled: false,
            error: None,
            handled: false,
        }
    }

    pub(crate) fn cancelled(generation: u64) -> Self {
        Self {
            cancelled: true,
            ..Self::completed(generation)
        }
    }

    pub(crate) fn failed(generation: u64, error: ExecutorError) -> Self {
        Self {
            error: Some(error),
            ..Self::completed(generation)
        }
    }

    /// Marks the error as dealt with so it is not returned to the caller.
    pub fn mark_handled(&mut self) {
        self.handled = true;
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }
}

/// A notification from a data source.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSourceEvent {
    PropertyChanged(ViewProperty),
    CollectionChanged(CollectionChange),
    CurrentChanged { position: Option<usize> },
    PageChanging { page_index: usize },
    PageChanged { page_index: usize },
    LoadingData(LoadingDataEvent),
    LoadedData(LoadedDataEvent),
    SubmittingChanges(SubmittingChangesEvent),
    SubmittedChanges(SubmittedChangesEvent),
}

/// Handle returned by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&mut DataSourceEvent) + Send>;

/// Dispatches events to listeners in subscription order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionId, Listener)>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It may mutate the event, e.g. to cancel a
    /// load or mark an error handled.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&mut DataSourceEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Forwards a copy of every event to a channel. Events raised after the
    /// receiver is dropped are discarded.
    pub fn subscribe_channel(&mut self) -> (SubscriptionId, mpsc::UnboundedReceiver<DataSourceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Runs every listener and returns the event as they left it.
    pub fn emit(&mut self, mut event: DataSourceEvent) -> DataSourceEvent {
        for (_, listener) in &mut self.listeners {
            listener(&mut event);
        }
        event
    }
}
