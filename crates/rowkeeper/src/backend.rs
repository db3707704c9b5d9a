//! Backend collaborator contract
//!
//! Everything the reconciler and mutation layer need from the shopping
//! backend, behind one async trait so tests can swap in an in-memory mock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;
use crate::events::ChatEvent;
use crate::offer::{deserialize_offers, BidId, Offer, ProviderStatusSnapshot, QuoteId};
use crate::row::{Row, RowId, RowStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub query: Option<String>,
  /// `None` searches every provider the backend has enabled
  #[serde(skip_serializing_if = "Option::is_none")]
  pub providers: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchResponse {
  #[serde(default, deserialize_with = "deserialize_offers")]
  pub results: Vec<Offer>,
  #[serde(default)]
  pub provider_statuses: Vec<ProviderStatusSnapshot>,
  #[serde(default)]
  pub user_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectResponse {
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub row_status: Option<RowStatus>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LikeResponse {
  pub is_liked: bool,
  #[serde(default)]
  pub liked_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub bid_id: Option<BidId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRequest {
  pub row_id: RowId,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bid_id: Option<BidId>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub offer_url: Option<String>,
  pub body: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comment {
  pub id: i64,
  pub body: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub bid_id: Option<BidId>,
  #[serde(default)]
  pub row_id: Option<RowId>,
}

/// Partial row update sent with `PATCH /rows/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status: Option<RowStatus>,
  /// Answers map serialized to a JSON string, as the backend stores it
  #[serde(skip_serializing_if = "Option::is_none")]
  pub choice_answers: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub active_row_id: Option<RowId>,
  pub force_new_row: bool,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub providers: Vec<String>,
}

pub type ChatEventStream = BoxStream<'static, BackendResult<ChatEvent>>;

#[async_trait]
pub trait ShoppingBackend: Send + Sync {
  /// All rows owned by the current session
  async fn list_rows(&self) -> BackendResult<Vec<Row>>;

  async fn create_row(&self, title: &str) -> BackendResult<Row>;

  async fn update_row(&self, row_id: RowId, update: &RowUpdate) -> BackendResult<Row>;

  /// Soft-delete; the backend marks the row archived
  async fn archive_row(&self, row_id: RowId) -> BackendResult<()>;

  async fn search(&self, row_id: RowId, request: &SearchRequest) -> BackendResult<SearchResponse>;

  async fn select_offer(&self, row_id: RowId, bid_id: BidId) -> BackendResult<SelectResponse>;

  async fn select_quote(&self, quote_id: QuoteId) -> BackendResult<SelectResponse>;

  async fn toggle_like(&self, bid_id: BidId) -> BackendResult<LikeResponse>;

  async fn create_comment(&self, request: &CommentRequest) -> BackendResult<Comment>;

  /// Open the chat event stream for one user message
  async fn chat_stream(&self, request: &ChatRequest) -> BackendResult<ChatEventStream>;
}
