use std::sync::Arc;

use crate::archive::ArchiveController;
use crate::backend::ShoppingBackend;
use crate::chat::ChatDriver;
use crate::config::RowkeeperConfig;
use crate::error::BackendResult;
use crate::mutations::OptimisticMutations;
use crate::reconciler::SearchReconciler;
use crate::row::RowStatus;
use crate::session::Session;
use crate::store::Store;

/// Every component wired around one store and one backend
pub struct App {
  pub store: Store,
  pub backend: Arc<dyn ShoppingBackend>,
  pub session: Session,
  pub reconciler: Arc<SearchReconciler>,
  pub mutations: OptimisticMutations,
  pub archive: ArchiveController,
  pub chat: ChatDriver,
}

impl App {
  pub fn new(config: &RowkeeperConfig, backend: Arc<dyn ShoppingBackend>, session: Session) -> Self {
    let store = Store::new();
    let reconciler =
      Arc::new(SearchReconciler::new(store.clone(), Arc::clone(&backend), config.search.clone()));

    Self {
      mutations: OptimisticMutations::new(store.clone(), Arc::clone(&backend), session.clone()),
      archive: ArchiveController::new(store.clone(), Arc::clone(&backend), config.archive.undo_window()),
      chat: ChatDriver::new(
        store.clone(),
        Arc::clone(&backend),
        Arc::clone(&reconciler),
        config.intent.clone(),
      ),
      store,
      backend,
      session,
      reconciler,
    }
  }

  /// Replace the store's rows with the backend's listing, minus archived rows
  pub async fn load_rows(&self) -> BackendResult<usize> {
    let rows: Vec<_> =
      self.backend.list_rows().await?.into_iter().filter(|row| row.status != RowStatus::Archived).collect();
    let count = rows.len();
    self.store.set_rows(rows);
    Ok(count)
  }
}
