
use std::sync::Arc;
use std::time::Duration;

use mock_backend::{offer, MockBackend};
use rowkeeper::{ArchiveController, BackendError, Row, Store};

const WINDOW: Duration = Duration::from_secs(6);

fn setup() -> (Store, Arc<MockBackend>, ArchiveController) {
  let store = Store::new();
  store.set_rows(vec![Row::new(1, "hoodie"), Row::new(2, "lamp"), Row::new(3, "shoes")]);
  store.set_row_results(2, vec![offer(9, "Desk lamp")], None);

  let backend = Arc::new(MockBackend::new());
  let archive = ArchiveController::new(store.clone(), backend.clone(), WINDOW);
  (store, backend, archive)
}

fn row_ids(store: &Store) -> Vec<i64> {
  store.rows().iter().map(|row| row.id).collect()
}

#[tokio::test(start_paused = true)]
async fn test_undo_restores_position() {
  let (store, backend, archive) = setup();

  assert!(archive.request_delete_row(2).await);
  assert_eq!(row_ids(&store), vec![1, 3]);
  assert_eq!(archive.pending_row_id(), Some(2));

  assert_eq!(archive.undo_delete_row(), Some(2));
  assert_eq!(row_ids(&store), vec![1, 2, 3]);
  assert_eq!(store.offers(2).len(), 1);

  tokio::time::sleep(WINDOW * 2).await;
  assert!(backend.archived_rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_undo_is_noop() {
  let (store, _backend, archive) = setup();

  archive.request_delete_row(2).await;
  assert_eq!(archive.undo_delete_row(), Some(2));
  assert_eq!(archive.undo_delete_row(), None);
  assert_eq!(row_ids(&store), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_timer_archives_after_window() {
  let (store, backend, archive) = setup();

  archive.request_delete_row(2).await;
  tokio::time::sleep(WINDOW + Duration::from_millis(10)).await;

  assert_eq!(backend.archived_rows(), vec![2]);
  assert_eq!(archive.pending_row_id(), None);
  assert!(store.offers(2).is_empty());
  assert_eq!(archive.undo_delete_row(), None);
  assert_eq!(row_ids(&store), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_new_delete_finalizes_pending_row() {
  let (store, backend, archive) = setup();

  archive.request_delete_row(1).await;
  archive.request_delete_row(3).await;

  assert_eq!(backend.archived_rows(), vec![1]);
  assert_eq!(archive.pending_row_id(), Some(3));
  assert_eq!(archive.undo_delete_row(), Some(3));
  assert_eq!(row_ids(&store), vec![2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_flush_archives_immediately() {
  let (_store, backend, archive) = setup();

  archive.request_delete_row(3).await;
  assert_eq!(archive.flush().await, Some(3));
  assert_eq!(backend.archived_rows(), vec![3]);

  tokio::time::sleep(WINDOW * 2).await;
  assert_eq!(backend.archived_rows(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_is_not_raised() {
  let (_store, backend, archive) = setup();
  backend.fail_mutations(BackendError::transport("offline"));

  archive.request_delete_row(1).await;
  assert_eq!(archive.flush().await, Some(1));
  assert!(backend.archived_rows().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_row_is_ignored() {
  let (_store, _backend, archive) = setup();
  assert!(!archive.request_delete_row(42).await);
  assert_eq!(archive.pending_row_id(), None);
}
