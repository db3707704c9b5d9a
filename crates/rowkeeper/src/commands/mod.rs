use std::sync::Arc;

use anyhow::{anyhow, Result};
use rowkeeper::{App, HttpBackend, RowId, RowkeeperConfig, Session};

pub mod answer;
pub mod archive;
pub mod chat;
pub mod offers;
pub mod rows;
pub mod search;

pub struct Context {
  pub config: RowkeeperConfig,
  pub app: App,
}

impl Context {
  pub fn new(server: Option<String>) -> Result<Self> {
    let mut config = RowkeeperConfig::load()?;
    if let Some(server) = server {
      config.backend.base_url = server;
      config.validate()?;
    }

    let session = Session::load_default()?;
    let backend = HttpBackend::new(config.backend.clone(), session.clone())?;
    let app = App::new(&config, Arc::new(backend), session);
    Ok(Self { config, app })
  }

  /// Load rows and make `row_id` active, fetching its offers if needed
  pub async fn open_row(&self, row_id: RowId) -> Result<()> {
    self.app.load_rows().await?;
    if !self.app.store.contains_row(row_id) {
      return Err(anyhow!("Row #{} not found. Use 'rowkeeper rows' to list your rows.", row_id));
    }
    self.app.reconciler.activate_row(row_id).await;
    Ok(())
  }

  pub fn print_row(&self, row_id: RowId) {
    if let Some(row) = self.app.store.row(row_id) {
      for line in rowkeeper::display::render_row(&row, &self.app.store.row_results(row_id)) {
        println!("{line}");
      }
    }
  }
}
