use anyhow::{anyhow, Result};
use rowkeeper::Notice;

use super::Context;

fn report(notice: Notice) -> anyhow::Error {
  match notice {
    Notice::SignIn(message) => anyhow!("{message} (set ROWKEEPER_SESSION_TOKEN or sign in)"),
    Notice::Error(message) => anyhow!(message),
  }
}

pub async fn select(context: &Context, row_id: i64, offer_key: &str, quote: bool) -> Result<()> {
  context.open_row(row_id).await?;

  let mutations = &context.app.mutations;
  let result = if quote {
    mutations.select_quote(row_id, offer_key).await
  } else {
    mutations.select_offer(row_id, offer_key).await
  };
  result.map_err(report)?;

  bentley::success("Offer selected");
  context.print_row(row_id);
  Ok(())
}

pub async fn like(context: &Context, row_id: i64, offer_key: &str) -> Result<()> {
  context.open_row(row_id).await?;

  let liked = context.app.mutations.toggle_like(row_id, offer_key).await.map_err(report)?;
  bentley::success(if liked { "Liked" } else { "Like removed" });
  Ok(())
}

pub async fn comment(context: &Context, row_id: i64, offer_key: &str, body: &str) -> Result<()> {
  context.open_row(row_id).await?;

  let comment = context.app.mutations.add_comment(row_id, offer_key, body).await.map_err(report)?;
  bentley::success(&format!("Comment #{} saved", comment.id));
  Ok(())
}
