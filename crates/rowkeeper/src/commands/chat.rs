use anyhow::{anyhow, Result};
use rowkeeper::RowStatus;

use super::Context;

pub async fn handle(
  context: &Context,
  message: &str,
  row: Option<i64>,
  aggressiveness: Option<i32>,
) -> Result<()> {
  context.app.load_rows().await?;

  let active = row.or_else(|| {
    context.app.store.rows().into_iter().find(|row| row.status != RowStatus::Closed).map(|row| row.id)
  });
  if let Some(row_id) = active {
    if !context.app.store.contains_row(row_id) {
      return Err(anyhow!("Row #{} not found", row_id));
    }
    context.app.store.set_active_row_id(Some(row_id));
  }

  let aggressiveness = aggressiveness.unwrap_or(context.config.intent.aggressiveness);
  let turn = context.app.chat.send_with_aggressiveness(message, aggressiveness).await;

  if turn.forced_new_row {
    bentley::info("Starting a new row for this request");
  }
  for text in &turn.assistant {
    println!("{text}");
  }
  if let Some(question) = &turn.clarification {
    bentley::warn(question);
  }
  if let Some(disambiguation) = &turn.disambiguation {
    let subject = disambiguation.title.as_deref().unwrap_or("that");
    bentley::warn(&format!("Which {subject} did you mean?"));
    for (index, option) in disambiguation.options.iter().enumerate() {
      println!("  {}. {option}", index + 1);
    }
  }
  if let Some(outreach) = &turn.outreach {
    let category = outreach.category.as_deref().unwrap_or("service");
    bentley::info(&format!("Contacting {category} vendors for row #{}", outreach.row_id));
  }

  if let Some(row_id) = context.app.store.active_row_id() {
    if let Some(query) = context.app.reconciler.last_query(row_id) {
      bentley::info(&format!("Results for '{query}'"));
    }
    context.print_row(row_id);
  }

  match turn.error {
    Some(error) => Err(anyhow!(error)),
    None => Ok(()),
  }
}
