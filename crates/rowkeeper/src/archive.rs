//! Archive with undo
//!
//! Deleting a row hides it immediately and only archives it on the backend
//! once the undo window passes. There is a single pending slot: deleting a
//! second row while one is pending finalizes the first one right away.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::backend::ShoppingBackend;
use crate::row::{Row, RowId, RowPatch, RowStatus};
use crate::store::Store;

struct PendingArchive {
  row: Row,
  position: usize,
  generation: u64,
  timer: JoinHandle<()>,
}

struct ArchiveInner {
  store: Store,
  backend: Arc<dyn ShoppingBackend>,
  undo_window: Duration,
  slot: Mutex<Option<PendingArchive>>,
  generation: AtomicU64,
  archived: Notify,
}

#[derive(Clone)]
pub struct ArchiveController {
  inner: Arc<ArchiveInner>,
}

impl ArchiveController {
  pub fn new(store: Store, backend: Arc<dyn ShoppingBackend>, undo_window: Duration) -> Self {
    Self {
      inner: Arc::new(ArchiveInner {
        store,
        backend,
        undo_window,
        slot: Mutex::new(None),
        generation: AtomicU64::new(0),
        archived: Notify::new(),
      }),
    }
  }

  /// Hide `row_id` and start its undo window. Returns false if the row isn't in the store.
  pub async fn request_delete_row(&self, row_id: RowId) -> bool {
    if let Some(previous) = self.inner.take_pending() {
      previous.timer.abort();
      self.inner.finalize(previous.row).await;
    }

    let Some((row, position)) = self.inner.store.detach_row(row_id) else {
      return false;
    };

    let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
    let inner = Arc::clone(&self.inner);
    let timer = tokio::spawn(async move {
      tokio::time::sleep(inner.undo_window).await;
      inner.fire(generation).await;
    });

    *self.inner.slot() = Some(PendingArchive { row, position, generation, timer });
    tracing::debug!(row_id, "row pending archive");
    true
  }

  /// Cancel the pending delete and put the row back where it was.
  /// Returns None when nothing is pending.
  pub fn undo_delete_row(&self) -> Option<RowId> {
    let pending = self.inner.take_pending()?;
    pending.timer.abort();

    let row_id = pending.row.id;
    self.inner.store.restore_row(pending.row, pending.position);
    tracing::debug!(row_id, "archive undone");
    Some(row_id)
  }

  pub fn pending_row_id(&self) -> Option<RowId> {
    self.inner.slot().as_ref().map(|pending| pending.row.id)
  }

  /// Archive the pending row now instead of waiting out the window
  pub async fn flush(&self) -> Option<RowId> {
    let pending = self.inner.take_pending()?;
    pending.timer.abort();
    let row_id = pending.row.id;
    self.inner.finalize(pending.row).await;
    Some(row_id)
  }

  /// Resolves once the next pending row has been archived
  pub async fn archived(&self) {
    self.inner.archived.notified().await;
  }
}

impl ArchiveInner {
  fn slot(&self) -> MutexGuard<'_, Option<PendingArchive>> {
    self.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn take_pending(&self) -> Option<PendingArchive> {
    self.slot().take()
  }

  /// Timer expiry; a stale timer (undone or superseded) finds a different generation
  async fn fire(&self, generation: u64) {
    let pending = {
      let mut slot = self.slot();
      match slot.as_ref() {
        Some(pending) if pending.generation == generation => slot.take(),
        _ => None,
      }
    };

    if let Some(pending) = pending {
      self.finalize(pending.row).await;
    }
  }

  async fn finalize(&self, mut row: Row) {
    let row_id = row.id;
    RowPatch::status(RowStatus::Archived).apply(&mut row);
    self.store.drop_row_results(row_id);

    match self.backend.archive_row(row_id).await {
      Ok(()) => tracing::info!(row_id, title = %row.title, status = row.status.as_str(), "row archived"),
      Err(err) => tracing::warn!(row_id, error = %err, "failed to archive row"),
    }
    self.archived.notify_waiters();
  }
}
