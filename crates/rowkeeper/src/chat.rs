//! Chat driver
//!
//! Sends one user utterance to the agent and feeds its structured event
//! stream into the reconciler.

use std::sync::Arc;

use crate::backend::{ChatRequest, ShoppingBackend};
use crate::events::{Disambiguation, VendorOutreach};
use crate::intent::{should_force_new_row, IntentRouterConfig, RouteInput};
use crate::reconciler::{ChatNotice, SearchReconciler};
use crate::store::Store;

/// What the user should see after one chat turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatTurn {
  pub forced_new_row: bool,
  pub assistant: Vec<String>,
  pub clarification: Option<String>,
  /// Candidates the user should choose between
  pub disambiguation: Option<Disambiguation>,
  pub outreach: Option<VendorOutreach>,
  pub error: Option<String>,
}

pub struct ChatDriver {
  store: Store,
  backend: Arc<dyn ShoppingBackend>,
  reconciler: Arc<SearchReconciler>,
  intent: IntentRouterConfig,
}

impl ChatDriver {
  pub fn new(
    store: Store,
    backend: Arc<dyn ShoppingBackend>,
    reconciler: Arc<SearchReconciler>,
    intent: IntentRouterConfig,
  ) -> Self {
    Self { store, backend, reconciler, intent }
  }

  pub async fn send(&self, message: &str) -> ChatTurn {
    self.send_with_aggressiveness(message, self.intent.aggressiveness).await
  }

  pub async fn send_with_aggressiveness(&self, message: &str, aggressiveness: i32) -> ChatTurn {
    let active = self.store.active_row();
    let input = RouteInput {
      message,
      active_row_title: active.as_ref().map(|row| row.title.as_str()),
      aggressiveness,
    };
    let force_new_row = should_force_new_row(&input, &self.intent);
    if force_new_row {
      tracing::debug!(text = message, "message starts a new row");
    }

    let request = ChatRequest {
      message: message.to_string(),
      active_row_id: if force_new_row { None } else { active.as_ref().map(|row| row.id) },
      force_new_row,
      providers: self.reconciler.providers(),
    };

    let mut turn = ChatTurn { forced_new_row: force_new_row, ..ChatTurn::default() };
    self.reconciler.begin_turn(force_new_row);

    let stream = match self.backend.chat_stream(&request).await {
      Ok(stream) => stream,
      Err(err) => {
        tracing::warn!(error = %err, "failed to open chat stream");
        turn.error = Some(err.to_string());
        return turn;
      }
    };

    for notice in self.reconciler.consume_chat_stream(stream).await {
      match notice {
        ChatNotice::Assistant(text) => turn.assistant.push(text),
        ChatNotice::Clarification(text) => turn.clarification = Some(text),
        ChatNotice::Disambiguate(disambiguation) => turn.disambiguation = Some(disambiguation),
        ChatNotice::VendorOutreach(outreach) => turn.outreach = Some(outreach),
        ChatNotice::Error(message) => turn.error = Some(message),
      }
    }
    turn
  }
}
