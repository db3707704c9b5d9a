use anyhow::{anyhow, Result};

use super::Context;

pub async fn handle(context: &Context, row_id: i64) -> Result<()> {
  context.app.load_rows().await?;
  let title =
    context.app.store.row(row_id).map(|row| row.title).ok_or_else(|| anyhow!("Row #{} not found", row_id))?;

  let archive = &context.app.archive;
  archive.request_delete_row(row_id).await;

  let window = context.config.archive.undo_window();
  bentley::warn(&format!(
    "Archiving '{}' in {}s - press Ctrl-C to undo",
    title,
    window.as_secs()
  ));

  tokio::select! {
    _ = tokio::signal::ctrl_c() => {
      archive.undo_delete_row();
      bentley::info(&format!("Kept '{title}'"));
    }
    _ = archive.archived() => {
      bentley::success(&format!("Archived '{title}'"));
    }
  }
  Ok(())
}
