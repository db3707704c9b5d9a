//! HTTP implementation of the shopping backend
//!
//! A thin reqwest wrapper: every unary call is bounded by the configured
//! timeout, the session token (when present) rides along as a bearer header,
//! and HTTP statuses are mapped onto `BackendError` variants.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::timeout;

use crate::backend::{
  ChatEventStream, ChatRequest, Comment, CommentRequest, LikeResponse, RowUpdate, SearchRequest,
  SearchResponse, SelectResponse, ShoppingBackend,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, BackendResult};
use crate::offer::{BidId, QuoteId};
use crate::row::{Row, RowId};
use crate::session::Session;
use crate::sse::decode_chat_events;

pub struct HttpBackend {
  client: Client,
  config: BackendConfig,
  session: Session,
}

#[derive(serde::Serialize)]
struct CreateRowRequest<'a> {
  title: &'a str,
}

/// `{ "detail": "..." }` error bodies
#[derive(Deserialize)]
struct ErrorBody {
  detail: Option<String>,
  message: Option<String>,
}

impl HttpBackend {
  pub fn new(config: BackendConfig, session: Session) -> BackendResult<Self> {
    // Streaming responses outlive any fixed request timeout, so only connect is bounded here
    let client = Client::builder()
      .connect_timeout(config.timeout())
      .build()
      .map_err(|err| BackendError::transport(format!("failed to create HTTP client: {err}")))?;

    Ok(Self { client, config, session })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match self.session.token() {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }

  async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
    let response = timeout(self.config.timeout(), self.authorize(request).send()).await??;
    check_status(response).await
  }

  async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
    let response = self.send(request).await?;
    let body = timeout(self.config.timeout(), response.text()).await??;
    serde_json::from_str(&body).map_err(|err| BackendError::decode(err.to_string()))
  }
}

async fn check_status(response: Response) -> BackendResult<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let path = response.url().path().to_string();
  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<ErrorBody>(&body)
    .ok()
    .and_then(|parsed| parsed.detail.or(parsed.message))
    .unwrap_or(body);

  tracing::debug!(status = status.as_u16(), path = %path, "backend rejected request");

  Err(match status {
    StatusCode::UNAUTHORIZED => BackendError::AuthRequired,
    StatusCode::NOT_FOUND => BackendError::not_found(path),
    other => BackendError::rejected(other.as_u16(), message),
  })
}

#[async_trait]
impl ShoppingBackend for HttpBackend {
  async fn list_rows(&self) -> BackendResult<Vec<Row>> {
    self.send_json(self.client.get(self.url("/rows"))).await
  }

  async fn create_row(&self, title: &str) -> BackendResult<Row> {
    self.send_json(self.client.post(self.url("/rows")).json(&CreateRowRequest { title })).await
  }

  async fn update_row(&self, row_id: RowId, update: &RowUpdate) -> BackendResult<Row> {
    self.send_json(self.client.patch(self.url(&format!("/rows/{row_id}"))).json(update)).await
  }

  async fn archive_row(&self, row_id: RowId) -> BackendResult<()> {
    self.send(self.client.delete(self.url(&format!("/rows/{row_id}")))).await?;
    Ok(())
  }

  async fn search(&self, row_id: RowId, request: &SearchRequest) -> BackendResult<SearchResponse> {
    self.send_json(self.client.post(self.url(&format!("/rows/{row_id}/search"))).json(request)).await
  }

  async fn select_offer(&self, row_id: RowId, bid_id: BidId) -> BackendResult<SelectResponse> {
    let path = format!("/rows/{row_id}/options/{bid_id}/select");
    self.send_json(self.client.post(self.url(&path))).await
  }

  async fn select_quote(&self, quote_id: QuoteId) -> BackendResult<SelectResponse> {
    self.send_json(self.client.post(self.url(&format!("/quotes/{quote_id}/select")))).await
  }

  async fn toggle_like(&self, bid_id: BidId) -> BackendResult<LikeResponse> {
    self.send_json(self.client.post(self.url(&format!("/likes/{bid_id}/toggle")))).await
  }

  async fn create_comment(&self, request: &CommentRequest) -> BackendResult<Comment> {
    self.send_json(self.client.post(self.url("/comments")).json(request)).await
  }

  async fn chat_stream(&self, request: &ChatRequest) -> BackendResult<ChatEventStream> {
    let builder = self
      .client
      .post(self.url("/chat"))
      .header(reqwest::header::ACCEPT, "text/event-stream")
      .json(request);
    let response = self.send(builder).await?;
    Ok(decode_chat_events(Box::pin(response.bytes_stream())))
  }
}
