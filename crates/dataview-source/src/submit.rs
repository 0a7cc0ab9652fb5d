//! Submitting pending changes.

use crate::error::{DataSourceError, DataSourceResult, ExecutorError};
use crate::events::{
    DataSourceEvent, SubmittedChangesEvent, SubmittingChangesEvent, ViewProperty,
};
use crate::executor::SubmitResponse;
use crate::source::{DataSource, Message};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The submit currently in flight.
#[derive(Debug)]
pub(crate) struct SubmitOperation {
    pub(crate) generation: u64,
}

impl DataSource {
    /// Sends every pending change to the submit executor.
    ///
    /// Open add and edit transactions are committed first. Fails while a
    /// load or another submit is in flight.
    pub fn submit_changes(&mut self) -> DataSourceResult<()> {
        self.ensure_idle("submit")?;
        self.commit_open_transactions();

        let changes = self.entities.changeset();
        let before = self.busy_state();
        self.next_submit += 1;
        let generation = self.next_submit;
        self.submit = Some(SubmitOperation { generation });
        self.notify_busy_change(before);
        self.emit(DataSourceEvent::SubmittingChanges(SubmittingChangesEvent {
            generation,
            added: changes.added.len(),
            modified: changes.modified.len(),
            removed: changes.removed.len(),
        }));

        info!(
            "Submitting {} changes ({} added, {} modified, {} removed)",
            changes.len(),
            changes.added.len(),
            changes.modified.len(),
            changes.removed.len()
        );
        let executor = Arc::clone(&self.submit_executor);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = executor.submit(changes).await;
            let _ = tx.send(Message::Submitted { generation, result });
        });
        Ok(())
    }

    /// Abandons the submit in flight. Pending changes stay pending, so
    /// another submit may follow at once. Returns false if there was none.
    pub fn cancel_submit(&mut self) -> bool {
        let before = self.busy_state();
        let Some(operation) = self.submit.take() else {
            return false;
        };
        info!("Cancelled submit {}", operation.generation);
        self.notify_busy_change(before);
        self.emit(DataSourceEvent::SubmittedChanges(
            SubmittedChangesEvent::cancelled(operation.generation),
        ));
        true
    }

    pub(crate) fn complete_submit(
        &mut self,
        generation: u64,
        result: Result<SubmitResponse, ExecutorError>,
    ) -> DataSourceResult<()> {
        let before = self.busy_state();
        match self.submit.take() {
            Some(op) if op.generation == generation => {}
            other => {
                self.submit = other;
                debug!("Dropping stale result for submit {}", generation);
                return Ok(());
            }
        }

        let result = result.and_then(|response| {
            if response.conflicts.is_empty() {
                Ok(())
            } else {
                Err(ExecutorError::Conflict(response.conflicts))
            }
        });

        match result {
            Ok(()) => {
                let had_changes = self.entities.has_changes();
                for key in self.entities.accept_changes() {
                    self.pages.remove_entity(&key);
                    self.view.remove(&key);
                }
                self.removed.clear();
                info!("Submit {} completed", generation);
                self.notify_busy_change(before);
                if had_changes {
                    self.notify(ViewProperty::HasChanges);
                }
                self.emit(DataSourceEvent::SubmittedChanges(
                    SubmittedChangesEvent::completed(generation),
                ));
                Ok(())
            }
            Err(error) => {
                warn!("Submit {} failed: {}", generation, error);
                self.notify_busy_change(before);
                let event = self.emit(DataSourceEvent::SubmittedChanges(
                    SubmittedChangesEvent::failed(generation, error.clone()),
                ));
                match event {
                    DataSourceEvent::SubmittedChanges(submitted) if submitted.is_handled() => Ok(()),
                    _ => Err(DataSourceError::Submit(error)),
                }
            }
        }
    }
}
