use anyhow::Result;
use rowkeeper::display::row_line;

use super::Context;

pub async fn handle(context: &Context) -> Result<()> {
  let count = context.app.load_rows().await?;
  if count == 0 {
    bentley::info("No rows yet. Start one with 'rowkeeper chat \"what you need\"'.");
    return Ok(());
  }

  bentley::announce(&format!("{count} rows"));
  for row in context.app.store.rows() {
    println!("{}", row_line(&row));
    if !row.choice_answers.is_empty() {
      let answers: Vec<String> =
        row.choice_answers.iter().map(|(name, value)| format!("{name}={value}")).collect();
      println!("    {}", answers.join(", "));
    }
  }
  Ok(())
}
