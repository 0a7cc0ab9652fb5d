//! Load coordination: generations, supersession, paging windows and
//! progressive chunks.

use crate::error::{Activity, DataSourceError, DataSourceResult, ExecutorError};
use crate::events::{CollectionChange, DataSourceEvent, LoadedDataEvent, LoadingDataEvent, ViewProperty};
use crate::executor::{PagingWindow, QueryRequest, QueryResponse};
use crate::page_cache::last_page_for;
use crate::source::{BusyState, DataSource, Message, ViewSnapshot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a load fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadKind {
    /// The whole result set.
    Full,
    /// A window of pages starting at `page_index`. `fallback` is set once
    /// the load has already retreated from an empty page.
    Page { page_index: usize, fallback: bool },
    /// One chunk of a progressive load.
    Progressive { offset: usize, chunk: usize },
}

/// The load currently in flight. Only a completion carrying its
/// generation is applied.
#[derive(Debug)]
pub(crate) struct LoadOperation {
    pub(crate) generation: u64,
    pub(crate) kind: LoadKind,
    /// Keys accumulated across progressive chunks.
    pub(crate) buffer_len: usize,
}

/// Whether an internally requested load honours the load delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadTrigger {
    Debounced,
    Immediate,
}

impl DataSource {
    /// Loads the current configuration, superseding any load in flight.
    ///
    /// The page cache starts a new generation, so the current page is
    /// fetched again. Fails while a submit is in flight or while loads are
    /// deferred.
    pub fn load(&mut self) -> DataSourceResult<()> {
        self.ensure_not_submitting("load")?;
        if self.defer.is_active() {
            return Err(Self::reentrancy("load", Activity::Deferring));
        }
        self.load_timer.stop();
        self.pages.invalidate();
        self.start_load(self.plan(self.target_page));
        Ok(())
    }

    /// Cancels the load in flight. Returns false if there was none.
    pub fn cancel_load(&mut self) -> bool {
        let before = self.busy_state();
        let Some(operation) = self.load.take() else {
            return false;
        };
        info!("Cancelled load {}", operation.generation);
        self.progressive_timer.stop();
        self.notify_busy_change(before);
        self.emit(DataSourceEvent::LoadedData(LoadedDataEvent::cancelled(
            operation.generation,
        )));
        true
    }

    /// Loads on behalf of the data source itself: auto-load, timers and
    /// page navigation. Inside a defer scope this only marks the scope
    /// dirty.
    pub(crate) fn request_load(&mut self, trigger: LoadTrigger) {
        if self.is_submitting_changes() {
            debug!("Ignoring load request while submitting");
            return;
        }
        if self.defer.is_active() {
            self.load_timer.stop();
            self.defer.mark_dirty();
            return;
        }
        match trigger {
            LoadTrigger::Debounced if !self.config.load_delay.is_zero() => {
                self.load_timer.start(self.config.load_delay, &self.tx);
            }
            _ => {
                self.load_timer.stop();
                self.start_load(self.plan(self.target_page));
            }
        }
    }

    pub(crate) fn plan(&self, page_index: usize) -> LoadKind {
        if self.config.page_size > 0 {
            LoadKind::Page {
                page_index,
                fallback: false,
            }
        } else if self.config.is_progressive() {
            LoadKind::Progressive {
                offset: 0,
                chunk: 0,
            }
        } else {
            LoadKind::Full
        }
    }

    /// Starts a new generation, reporting the one it replaces as cancelled.
    pub(crate) fn start_load(&mut self, kind: LoadKind) {
        let before = self.busy_state();
        if let Some(previous) = self.load.take() {
            debug!("Load {} superseded", previous.generation);
            self.emit(DataSourceEvent::LoadedData(LoadedDataEvent::cancelled(
                previous.generation,
            )));
        }
        self.begin_operation(kind, before);
    }

    fn begin_operation(&mut self, kind: LoadKind, before: BusyState) {
        self.commit_open_transactions();
        self.progressive_timer.stop();
        self.next_load += 1;
        self.load = Some(LoadOperation {
            generation: self.next_load,
            kind,
            buffer_len: 0,
        });
        self.notify_busy_change(before);
        if let LoadKind::Page { page_index, .. } = kind {
            if self.view.page_index() != Some(page_index) {
                self.emit(DataSourceEvent::PageChanging { page_index });
            }
        }
        self.dispatch_current();
    }

    /// Sends the current operation's query to the executor.
    fn dispatch_current(&mut self) {
        let Some((generation, kind)) = self.load.as_ref().map(|op| (op.generation, op.kind)) else {
            return;
        };
        let request = self.build_request(kind);
        let chunk = match kind {
            LoadKind::Progressive { chunk, .. } => Some(chunk),
            _ => None,
        };

        let event = self.emit(DataSourceEvent::LoadingData(LoadingDataEvent::new(
            generation,
            request.clone(),
            chunk,
        )));
        if matches!(&event, DataSourceEvent::LoadingData(loading) if loading.is_cancelled()) {
            self.cancel_load();
            return;
        }

        debug!(
            "Dispatching load {} for {} ({:?})",
            generation, request.query_name, request.window
        );
        let executor = Arc::clone(&self.query_executor);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = executor.execute(request).await;
            let _ = tx.send(Message::Queried { generation, result });
        });
    }

    pub(crate) fn dispatch_next_chunk(&mut self) {
        if self
            .load
            .as_ref()
            .is_some_and(|op| matches!(op.kind, LoadKind::Progressive { .. }))
        {
            self.dispatch_current();
        }
    }

    fn build_request(&self, kind: LoadKind) -> QueryRequest {
        let window = match kind {
            LoadKind::Full => None,
            LoadKind::Page { page_index, .. } => Some(PagingWindow {
                skip: page_index * self.config.page_size,
                take: self.config.page_size * self.config.pages_per_load(),
            }),
            LoadKind::Progressive { offset, .. } => Some(PagingWindow {
                skip: offset,
                take: self.config.load_size,
            }),
        };
        QueryRequest {
            query_name: self.config.query_name.clone(),
            descriptor: self.descriptor.clone(),
            window,
            include_total_count: matches!(kind, LoadKind::Page { .. }),
        }
    }

    /// Applies a query result. Results from superseded or cancelled
    /// generations are dropped.
    pub(crate) fn complete_load(
        &mut self,
        generation: u64,
        result: Result<QueryResponse, ExecutorError>,
    ) -> DataSourceResult<()> {
        let before = self.busy_state();
        let operation = match self.load.take() {
            Some(op) if op.generation == generation => op,
            other => {
                self.load = other;
                debug!("Dropping stale result for load {}", generation);
                return Ok(());
            }
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!("Load {} failed: {}", generation, error);
                self.progressive_timer.stop();
                self.notify_busy_change(before);
                let event = self.emit(DataSourceEvent::LoadedData(LoadedDataEvent::failed(
                    generation,
                    error.clone(),
                )));
                return match event {
                    DataSourceEvent::LoadedData(loaded) if loaded.is_handled() => Ok(()),
                    _ => Err(DataSourceError::Load(error)),
                };
            }
        };

        match operation.kind {
            LoadKind::Full => {
                let snapshot = self.view_snapshot();
                let keys = self.entities.merge_loaded(response.entities);
                self.pages
                    .set_total_item_count(response.total_count.or(Some(keys.len())));
                self.view.replace(keys);
                self.view.set_page_index(None);
                self.view.regroup(&self.descriptor, &self.entities);
                self.finish_load(before, &snapshot, generation, None);
            }
            LoadKind::Page {
                page_index,
                fallback,
            } => {
                if response.entities.is_empty() && page_index > 0 {
                    let target = match response.total_count {
                        Some(total) if !fallback => last_page_for(total, self.config.page_size),
                        _ => 0,
                    };
                    let target = if target >= page_index { 0 } else { target };
                    info!(
                        "Page {} of {} is empty, falling back to page {}",
                        page_index, self.config.query_name, target
                    );
                    if response.total_count.is_some() {
                        self.pages.set_total_item_count(response.total_count);
                    }
                    self.target_page = target;
                    self.begin_operation(
                        LoadKind::Page {
                            page_index: target,
                            fallback: true,
                        },
                        before,
                    );
                    return Ok(());
                }

                let snapshot = self.view_snapshot();
                let page_size = self.config.page_size;
                let keys = self.entities.merge_loaded(response.entities);
                self.pages.store(
                    self.pages.generation(),
                    page_index,
                    page_size,
                    &keys,
                    response.total_count,
                );
                let shown: Vec<_> = keys.into_iter().take(page_size).collect();
                self.view.replace(shown);
                self.view.set_page_index(Some(page_index));
                self.target_page = page_index;
                self.view.regroup(&self.descriptor, &self.entities);
                let changed_page = (snapshot.page_index != Some(page_index)).then_some(page_index);
                self.finish_load(before, &snapshot, generation, changed_page);
            }
            LoadKind::Progressive { offset, chunk } => {
                let snapshot = self.view_snapshot();
                let received = response.entities.len();
                let keys = self.entities.merge_loaded(response.entities);
                let buffer_len = operation.buffer_len + keys.len();
                if chunk == 0 {
                    self.view.replace(keys);
                    self.view.set_page_index(None);
                } else {
                    self.view.append(keys);
                }
                self.view.regroup(&self.descriptor, &self.entities);

                if received >= self.config.load_size {
                    debug!(
                        "Load {} chunk {} returned {} entities, continuing",
                        generation, chunk, received
                    );
                    self.load = Some(LoadOperation {
                        generation,
                        kind: LoadKind::Progressive {
                            offset: offset + received,
                            chunk: chunk + 1,
                        },
                        buffer_len,
                    });
                    self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Reset));
                    self.notify_view_changes(&snapshot);
                    if !self.descriptor.groups.is_empty() {
                        self.notify(ViewProperty::Groups);
                    }
                    let count = self.view.count();
                    self.emit(DataSourceEvent::LoadedData(LoadedDataEvent::completed(
                        generation, count, None, true,
                    )));
                    self.progressive_timer
                        .start(self.config.progressive_load_interval, &self.tx);
                } else {
                    self.pages.set_total_item_count(Some(buffer_len));
                    self.finish_load(before, &snapshot, generation, None);
                }
            }
        }
        Ok(())
    }

    /// Raises the notifications for a finished load in order: property
    /// changes, then loaded-data, then page-changed.
    fn finish_load(
        &mut self,
        before: BusyState,
        snapshot: &ViewSnapshot,
        generation: u64,
        changed_page: Option<usize>,
    ) {
        self.notify_busy_change(before);
        self.emit(DataSourceEvent::CollectionChanged(CollectionChange::Reset));
        self.notify_view_changes(snapshot);
        if !self.descriptor.groups.is_empty() {
            self.notify(ViewProperty::Groups);
        }
        let count = self.view.count();
        info!("Load {} completed with {} entities", generation, count);
        self.emit(DataSourceEvent::LoadedData(LoadedDataEvent::completed(
            generation,
            count,
            self.pages.total_item_count(),
            false,
        )));
        if let Some(page_index) = changed_page {
            self.emit(DataSourceEvent::PageChanged { page_index });
        }
    }
}
