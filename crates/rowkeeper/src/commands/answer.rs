use anyhow::{anyhow, Result};
use serde_json::Value;

use super::Context;

/// JSON literals (numbers, booleans, quoted strings) are kept typed; anything else is text
fn parse_value(raw: &str) -> Value {
  serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn handle(context: &Context, row_id: i64, name: &str, raw: &str) -> Result<()> {
  context.app.load_rows().await?;
  let row = context.app.store.row(row_id).ok_or_else(|| anyhow!("Row #{} not found", row_id))?;

  if !row.choice_factors.is_empty() && !row.choice_factors.iter().any(|factor| factor.name == name) {
    bentley::warn(&format!("'{name}' isn't one of this row's questions; saving it anyway"));
  }

  context
    .app
    .mutations
    .set_choice_answer(row_id, name, parse_value(raw))
    .await
    .map_err(|notice| anyhow!(notice.to_string()))?;

  bentley::success(&format!("Saved {name} for row #{row_id}"));
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn typed_values_survive() {
    assert_eq!(parse_value("42"), Value::from(42));
    assert_eq!(parse_value("true"), Value::Bool(true));
    assert_eq!(parse_value("navy blue"), Value::String("navy blue".into()));
  }
}
