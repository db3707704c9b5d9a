//! Optimistic mutations
//!
//! Each interaction writes its expected outcome into the store right away,
//! then asks the backend. A confirmation reconciles the authoritative values;
//! a failure puts back exactly what was there before. All writes are targeted
//! at the offers involved so concurrent stream batches are never clobbered.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::backend::{Comment, CommentRequest, RowUpdate, ShoppingBackend};
use crate::error::BackendError;
use crate::offer::{bid_matcher, derive_offer_key, key_matcher, BidId, Offer, OfferPatch, QuoteId};
use crate::row::{RowId, RowPatch, RowStatus};
use crate::session::Session;
use crate::store::Store;

/// User-facing outcome of a failed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Error(String),
  /// The session is missing or expired
  SignIn(String),
}

impl std::fmt::Display for Notice {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Notice::Error(message) | Notice::SignIn(message) => write!(f, "{message}"),
    }
  }
}

pub type MutationResult<T> = Result<T, Notice>;

const SIGN_IN_TO_LIKE: &str = "Sign in to like offers";
const SIGN_IN_TO_COMMENT: &str = "Sign in to comment on offers";
const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";

#[derive(Debug, Clone, Copy)]
enum SelectTarget {
  Bid(BidId),
  Quote(QuoteId),
}

pub struct OptimisticMutations {
  store: Store,
  backend: Arc<dyn ShoppingBackend>,
  session: Session,
}

impl OptimisticMutations {
  pub fn new(store: Store, backend: Arc<dyn ShoppingBackend>, session: Session) -> Self {
    Self { store, backend, session }
  }

  fn lookup(&self, row_id: RowId, offer_key: &str) -> MutationResult<Offer> {
    self
      .store
      .find_offer(row_id, offer_key)
      .map(|(_, offer)| offer)
      .ok_or_else(|| Notice::Error("That offer is no longer available".to_string()))
  }

  /// Rejections become error notices; auth failures also drop the cached credential
  fn notice(&self, err: BackendError, context: &str) -> Notice {
    if err.is_auth_required() {
      tracing::info!("backend requires sign in, clearing session");
      self.session.clear();
      return Notice::SignIn(SESSION_EXPIRED.to_string());
    }
    tracing::warn!(error = %err, "{context}");
    Notice::Error(format!("{context}. Please try again."))
  }

  pub async fn select_offer(&self, row_id: RowId, offer_key: &str) -> MutationResult<()> {
    let offer = self.lookup(row_id, offer_key)?;
    let bid_id = offer
      .bid_id
      .ok_or_else(|| Notice::Error("This offer can't be selected until it is saved".to_string()))?;
    self.select(row_id, offer_key, SelectTarget::Bid(bid_id)).await
  }

  /// Select a service provider's quote
  pub async fn select_quote(&self, row_id: RowId, offer_key: &str) -> MutationResult<()> {
    let offer = self.lookup(row_id, offer_key)?;
    let quote_id =
      offer.quote_id.ok_or_else(|| Notice::Error("This vendor hasn't sent a quote yet".to_string()))?;
    self.select(row_id, offer_key, SelectTarget::Quote(quote_id)).await
  }

  async fn select(&self, row_id: RowId, offer_key: &str, target: SelectTarget) -> MutationResult<()> {
    let prior_status = self.store.row(row_id).map(|row| row.status);

    self.store.update_row_offer(
      row_id,
      |offer, index| derive_offer_key(offer, index) != offer_key,
      &OfferPatch::selected(false),
    );
    self.store.update_row_offer(row_id, key_matcher(offer_key), &OfferPatch::selected(true));
    self.store.update_row(row_id, &RowPatch::status(RowStatus::Closed));

    let confirmed = match target {
      SelectTarget::Bid(bid_id) => self.backend.select_offer(row_id, bid_id).await,
      SelectTarget::Quote(quote_id) => self.backend.select_quote(quote_id).await,
    };

    match confirmed {
      Ok(response) => {
        if let Some(status) = response.row_status {
          self.store.update_row(row_id, &RowPatch::status(status));
        }
        tracing::debug!(row_id, offer_key, "selection confirmed");
        Ok(())
      }
      Err(err) => {
        self.store.update_row_offer(row_id, key_matcher(offer_key), &OfferPatch::selected(false));
        if let Some(status) = prior_status {
          self.store.update_row(row_id, &RowPatch::status(status));
        }
        Err(self.notice(err, "Couldn't select this offer"))
      }
    }
  }

  /// Flip the like on a saved offer. Returns the confirmed state.
  pub async fn toggle_like(&self, row_id: RowId, offer_key: &str) -> MutationResult<bool> {
    if !self.session.is_logged_in() {
      return Err(Notice::SignIn(SIGN_IN_TO_LIKE.to_string()));
    }

    let offer = self.lookup(row_id, offer_key)?;
    let bid_id = offer.bid_id.ok_or_else(|| Notice::Error("Only saved offers can be liked".to_string()))?;

    let prior = OfferPatch::liked(offer.is_liked, offer.liked_at);
    let liked = !offer.is_liked;
    let liked_at = liked.then(Utc::now);
    self.store.update_row_offer(row_id, bid_matcher(bid_id), &OfferPatch::liked(liked, liked_at));

    match self.backend.toggle_like(bid_id).await {
      Ok(response) => {
        let confirmed_at = response.liked_at.or(if response.is_liked { liked_at } else { None });
        self
          .store
          .update_row_offer(row_id, bid_matcher(bid_id), &OfferPatch::liked(response.is_liked, confirmed_at));
        Ok(response.is_liked)
      }
      Err(err) => {
        self.store.update_row_offer(row_id, bid_matcher(bid_id), &prior);
        Err(self.notice(err, "Couldn't update your like"))
      }
    }
  }

  pub async fn add_comment(&self, row_id: RowId, offer_key: &str, body: &str) -> MutationResult<Comment> {
    if !self.session.is_logged_in() {
      return Err(Notice::SignIn(SIGN_IN_TO_COMMENT.to_string()));
    }

    let body = body.trim();
    if body.is_empty() {
      return Err(Notice::Error("Comment can't be empty".to_string()));
    }

    let offer = self.lookup(row_id, offer_key)?;
    let prior = OfferPatch::comment_preview(offer.comment_preview.clone());
    self
      .store
      .update_row_offer(row_id, key_matcher(offer_key), &OfferPatch::comment_preview(Some(body.to_string())));

    let request = CommentRequest {
      row_id,
      bid_id: offer.bid_id,
      offer_url: if offer.bid_id.is_some() { None } else { offer.url.clone().or(offer.click_url.clone()) },
      body: body.to_string(),
    };

    match self.backend.create_comment(&request).await {
      Ok(comment) => Ok(comment),
      Err(err) => {
        self.store.update_row_offer(row_id, key_matcher(offer_key), &prior);
        Err(self.notice(err, "Couldn't save your comment"))
      }
    }
  }

  /// Answer one choice factor. Rollback only touches this answer.
  pub async fn set_choice_answer(&self, row_id: RowId, name: &str, value: Value) -> MutationResult<()> {
    let row = self.store.row(row_id).ok_or_else(|| Notice::Error("That row no longer exists".to_string()))?;
    let prior = row.choice_answers.get(name).cloned();

    let mut answers = row.choice_answers;
    answers.insert(name.to_string(), value);
    self.store.update_row(row_id, &RowPatch::answers(answers.clone()));

    let serialized = serde_json::to_string(&answers).map_err(|err| {
      self.replace_answer(row_id, name, prior.clone());
      Notice::Error(format!("Couldn't save your answer: {err}"))
    })?;
    let update = RowUpdate { choice_answers: Some(serialized), ..RowUpdate::default() };

    match self.backend.update_row(row_id, &update).await {
      Ok(confirmed) => {
        if let Some(value) = confirmed.choice_answers.get(name) {
          self.replace_answer(row_id, name, Some(value.clone()));
        }
        Ok(())
      }
      Err(err) => {
        self.replace_answer(row_id, name, prior);
        Err(self.notice(err, "Couldn't save your answer"))
      }
    }
  }

  fn replace_answer(&self, row_id: RowId, name: &str, value: Option<Value>) {
    let Some(row) = self.store.row(row_id) else {
      return;
    };
    let mut answers = row.choice_answers;
    match value {
      Some(value) => answers.insert(name.to_string(), value),
      None => answers.remove(name),
    };
    self.store.update_row(row_id, &RowPatch::answers(answers));
  }
}
