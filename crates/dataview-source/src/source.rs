//! The data source: state, accessors and the message pump.
//!
//! A [`DataSource`] is owned by one task. Queries, submits and timers run as
//! spawned tasks and report back through an unbounded channel; nothing they
//! produce touches the data source until the owner applies it with
//! [`DataSource::process_next`].

use crate::config::SourceConfig;
use crate::defer::DeferState;
use crate::editing::RemovedSlot;
use crate::error::{Activity, DataSourceError, DataSourceResult, ExecutorError};
use crate::entity_set::EntitySet;
use crate::events::{DataSourceEvent, EventBus, SubscriptionId, ViewProperty};
use crate::executor::{QueryExecutor, QueryResponse, SubmitExecutor, SubmitResponse};
use crate::load::{LoadOperation, LoadTrigger};
use crate::page_cache::PageCache;
use crate::submit::SubmitOperation;
use crate::timer::{Timer, TimerKind};
use crate::view::{ViewGroup, ViewProjection};
use dataview_model::{Entity, EntityKey, EntitySchema, QueryDescriptor};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Work handed back to the owning task.
#[derive(Debug)]
pub(crate) enum Message {
    Queried {
        generation: u64,
        result: Result<QueryResponse, ExecutorError>,
    },
    Submitted {
        generation: u64,
        result: Result<SubmitResponse, ExecutorError>,
    },
    TimerFired {
        kind: TimerKind,
        token: u64,
    },
}

/// Busy flags, compared before and after a transition to decide which
/// property notifications to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BusyState {
    pub(crate) loading: bool,
    pub(crate) submitting: bool,
}

impl BusyState {
    fn busy(self) -> bool {
        self.loading || self.submitting
    }
}

/// View state compared before and after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ViewSnapshot {
    pub(crate) count: usize,
    pub(crate) total: Option<usize>,
    pub(crate) page_index: Option<usize>,
    pub(crate) position: Option<usize>,
    pub(crate) current: Option<EntityKey>,
}

/// A queryable, pageable collection bound to remote executors.
pub struct DataSource {
    pub(crate) config: SourceConfig,
    pub(crate) schema: EntitySchema,
    pub(crate) descriptor: QueryDescriptor,
    pub(crate) query_executor: Arc<dyn QueryExecutor>,
    pub(crate) submit_executor: Arc<dyn SubmitExecutor>,
    pub(crate) entities: EntitySet,
    pub(crate) pages: PageCache,
    pub(crate) view: ViewProjection,
    /// Where pending deletes sat in the window, in removal order.
    pub(crate) removed: Vec<RemovedSlot>,
    pub(crate) events: EventBus,
    pub(crate) load: Option<LoadOperation>,
    pub(crate) submit: Option<SubmitOperation>,
    pub(crate) next_load: u64,
    pub(crate) next_submit: u64,
    pub(crate) defer: DeferState,
    /// Page the next load fetches.
    pub(crate) target_page: usize,
    pub(crate) load_timer: Timer,
    pub(crate) refresh_timer: Timer,
    pub(crate) progressive_timer: Timer,
    pub(crate) tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl DataSource {
    /// Creates a data source backed by one executor for queries and
    /// submits.
    ///
    /// A configured refresh interval starts its timer here, which requires a
    /// running tokio runtime.
    pub fn new<E>(config: SourceConfig, schema: EntitySchema, executor: Arc<E>) -> DataSourceResult<Self>
    where
        E: QueryExecutor + SubmitExecutor + 'static,
    {
        let query: Arc<dyn QueryExecutor> = executor.clone();
        let submit: Arc<dyn SubmitExecutor> = executor;
        Self::with_executors(config, schema, query, submit)
    }

    /// Creates a data source with separate query and submit executors.
    pub fn with_executors(
        config: SourceConfig,
        schema: EntitySchema,
        query_executor: Arc<dyn QueryExecutor>,
        submit_executor: Arc<dyn SubmitExecutor>,
    ) -> DataSourceResult<Self> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = Self {
            config,
            schema,
            descriptor: QueryDescriptor::new(),
            query_executor,
            submit_executor,
            entities: EntitySet::new(),
            pages: PageCache::new(),
            view: ViewProjection::new(),
            removed: Vec::new(),
            events: EventBus::new(),
            load: None,
            submit: None,
            next_load: 0,
            next_submit: 0,
            defer: DeferState::default(),
            target_page: 0,
            load_timer: Timer::new(TimerKind::Load),
            refresh_timer: Timer::new(TimerKind::Refresh),
            progressive_timer: Timer::new(TimerKind::Progressive),
            tx,
            rx,
        };
        if let Some(interval) = source.config.refresh_interval {
            source.refresh_timer.start_repeating(interval, &source.tx);
        }
        Ok(source)
    }

    // ── Configuration and query state ───────────────────────────────

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn query_name(&self) -> &str {
        &self.config.query_name
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn load_size(&self) -> usize {
        self.config.load_size
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn entities(&self) -> &EntitySet {
        &self.entities
    }

    pub fn page_cache(&self) -> &PageCache {
        &self.pages
    }

    pub fn view(&self) -> &ViewProjection {
        &self.view
    }

    // ── View state ──────────────────────────────────────────────────

    /// Entities shown by the view, in view order.
    pub fn items(&self) -> Vec<&Entity> {
        self.view
            .items()
            .iter()
            .filter_map(|key| self.entities.get(key))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.view.count()
    }

    pub fn current_item(&self) -> Option<&Entity> {
        self.view.current_key().and_then(|key| self.entities.get(&key))
    }

    pub fn current_position(&self) -> Option<usize> {
        self.view.current_position()
    }

    pub fn page_index(&self) -> Option<usize> {
        self.view.page_index()
    }

    pub fn total_item_count(&self) -> Option<usize> {
        self.pages.total_item_count()
    }

    pub fn page_count(&self) -> Option<usize> {
        self.pages.page_count(self.config.page_size)
    }

    pub fn groups(&self) -> &[ViewGroup] {
        self.view.groups()
    }

    pub fn has_changes(&self) -> bool {
        self.entities.has_changes()
    }

    pub fn is_loading_data(&self) -> bool {
        self.load.is_some()
    }

    pub fn is_submitting_changes(&self) -> bool {
        self.submit.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.is_loading_data() || self.is_submitting_changes()
    }

    /// Whether an explicit load would be accepted.
    pub fn can_load(&self) -> bool {
        !self.is_submitting_changes() && !self.defer.is_active()
    }

    /// Generation of the most recently started load.
    pub fn load_generation(&self) -> u64 {
        self.next_load
    }

    // ── Subscriptions ───────────────────────────────────────────────

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&mut DataSourceEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(listener)
    }

    pub fn subscribe_channel(
        &mut self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<DataSourceEvent>) {
        self.events.subscribe_channel()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ── Driving ─────────────────────────────────────────────────────

    /// Waits for the next completion or timer tick and applies it.
    ///
    /// A failed load or submit whose completion event no listener marked
    /// handled is returned as an error.
    pub async fn process_next(&mut self) -> DataSourceResult<()> {
        match self.rx.recv().await {
            Some(message) => self.handle_message(message),
            None => Ok(()),
        }
    }

    /// Applies every message that is already waiting, without blocking.
    /// Returns how many were applied.
    pub fn process_pending(&mut self) -> DataSourceResult<usize> {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Processes messages until no load or submit is in flight.
    pub async fn wait_for_idle(&mut self) -> DataSourceResult<()> {
        while self.is_busy() {
            self.process_next().await?;
        }
        Ok(())
    }

    /// Processes messages until nothing is in flight and no debounce or
    /// progressive timer is armed.
    pub async fn settle(&mut self) -> DataSourceResult<()> {
        while self.is_busy() || self.load_timer.is_armed() || self.progressive_timer.is_armed() {
            self.process_next().await?;
        }
        Ok(())
    }

    fn handle_message(&mut self, message: Message) -> DataSourceResult<()> {
        match message {
            Message::Queried { generation, result } => self.complete_load(generation, result),
            Message::Submitted { generation, result } => self.complete_submit(generation, result),
            Message::TimerFired { kind, token } => {
                self.timer_fired(kind, token);
                Ok(())
            }
        }
    }

    fn timer_fired(&mut self, kind: TimerKind, token: u64) {
        match kind {
            TimerKind::Load => {
                if self.load_timer.accept(token) {
                    debug!("Load delay elapsed");
                    self.request_load(LoadTrigger::Immediate);
                }
            }
            TimerKind::Refresh => {
                if self.refresh_timer.accept(token) {
                    if self.is_busy() {
                        debug!("Skipping refresh while busy");
                    } else {
                        debug!("Refreshing {}", self.config.query_name);
                        self.pages.invalidate();
                        self.request_load(LoadTrigger::Immediate);
                    }
                }
            }
            TimerKind::Progressive => {
                if self.progressive_timer.accept(token) {
                    self.dispatch_next_chunk();
                }
            }
        }
    }

    // ── Guards and notifications ────────────────────────────────────

    pub(crate) fn reentrancy(operation: &'static str, activity: Activity) -> DataSourceError {
        DataSourceError::Reentrancy {
            operation,
            activity,
        }
    }

    pub(crate) fn ensure_not_submitting(&self, operation: &'static str) -> DataSourceResult<()> {
        if self.is_submitting_changes() {
            return Err(Self::reentrancy(operation, Activity::Submitting));
        }
        Ok(())
    }

    /// Rejects the operation while a load or submit is in flight.
    pub(crate) fn ensure_idle(&self, operation: &'static str) -> DataSourceResult<()> {
        self.ensure_not_submitting(operation)?;
        if self.is_loading_data() {
            return Err(Self::reentrancy(operation, Activity::Loading));
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: DataSourceEvent) -> DataSourceEvent {
        self.events.emit(event)
    }

    pub(crate) fn notify(&mut self, property: ViewProperty) {
        self.events.emit(DataSourceEvent::PropertyChanged(property));
    }

    pub(crate) fn busy_state(&self) -> BusyState {
        BusyState {
            loading: self.is_loading_data(),
            submitting: self.is_submitting_changes(),
        }
    }

    pub(crate) fn notify_busy_change(&mut self, before: BusyState) {
        let after = self.busy_state();
        if before.loading != after.loading {
            self.notify(ViewProperty::IsLoadingData);
        }
        if before.submitting != after.submitting {
            self.notify(ViewProperty::IsSubmittingChanges);
            self.notify(ViewProperty::CanLoad);
        }
        if before.busy() != after.busy() {
            self.notify(ViewProperty::IsBusy);
        }
    }

    pub(crate) fn view_snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            count: self.view.count(),
            total: self.pages.total_item_count(),
            page_index: self.view.page_index(),
            position: self.view.current_position(),
            current: self.view.current_key(),
        }
    }

    /// Raises property notifications for whatever differs from `before`,
    /// followed by a currency notification if the current item moved.
    pub(crate) fn notify_view_changes(&mut self, before: &ViewSnapshot) {
        let after = self.view_snapshot();
        if before.count != after.count {
            self.notify(ViewProperty::Count);
        }
        if before.total != after.total {
            self.notify(ViewProperty::TotalItemCount);
        }
        if before.page_index != after.page_index {
            self.notify(ViewProperty::PageIndex);
        }
        if before.position != after.position {
            self.notify(ViewProperty::CurrentPosition);
        }
        if before.current != after.current {
            self.notify(ViewProperty::CurrentItem);
        }
        if before.position != after.position || before.current != after.current {
            self.emit(DataSourceEvent::CurrentChanged {
                position: after.position,
            });
        }
    }

    /// Rebuilds groups and notifies if the view is grouped.
    pub(crate) fn regroup(&mut self) {
        self.view.regroup(&self.descriptor, &self.entities);
        if !self.descriptor.groups.is_empty() {
            self.notify(ViewProperty::Groups);
        }
    }
}
