use anyhow::Result;
use rowkeeper::{RefreshMode, RefreshOutcome};

use super::Context;

pub async fn handle(context: &Context, row_id: i64, providers: Vec<String>) -> Result<()> {
  context.app.load_rows().await?;
  context.app.store.set_active_row_id(Some(row_id));

  let mode = if providers.is_empty() { RefreshMode::All } else { RefreshMode::Providers(providers) };
  match context.app.reconciler.refresh(row_id, mode).await {
    RefreshOutcome::Issued => {}
    RefreshOutcome::CoolingDown => bentley::warn("Searched moments ago - try again shortly"),
    RefreshOutcome::InFlight => bentley::warn("A search for this row is already running"),
  }

  context.print_row(row_id);
  Ok(())
}
