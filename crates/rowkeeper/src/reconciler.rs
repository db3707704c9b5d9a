//! Streaming search reconciler
//!
//! Two paths feed search results into the store: the chat stream, which
//! delivers batches per provider as they finish, and direct refreshes the user
//! triggers. They can overlap on the same row, so the rules are:
//!
//! - a row with an open stream is *locked*: refreshes merge into it instead of
//!   replacing it, and an empty refresh never touches its offers;
//! - the lock and `more_incoming` go up before anything that could start an
//!   automatic load, so a freshly created row is never fetched twice;
//! - refreshes per row are spaced by a cooldown and never run concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use tokio::time::Instant;

use crate::backend::{ChatEventStream, SearchRequest, SearchResponse, ShoppingBackend};
use crate::config::SearchConfig;
use crate::events::{ActionStarted, ChatEvent, Disambiguation, SearchBatch, VendorOutreach};
use crate::messaging::{determine_search_user_message, SEARCH_UNAVAILABLE_MESSAGE};
use crate::offer::{dedupe_offers, Offer, ProviderStatusSnapshot};
use crate::row::{Row, RowId, RowPatch};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchPhase {
  #[default]
  Idle,
  Searching,
  StreamingResults,
  Settled,
  Error,
}

impl SearchPhase {
  pub fn is_open(&self) -> bool {
    matches!(self, Self::Searching | Self::StreamingResults)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMode {
  /// Every currently enabled provider
  All,
  Providers(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
  Issued,
  CoolingDown,
  InFlight,
}

/// Chat output meant for the user rather than the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatNotice {
  Assistant(String),
  Clarification(String),
  Disambiguate(Disambiguation),
  VendorOutreach(VendorOutreach),
  Error(String),
}

#[derive(Debug, Default)]
struct RowTracker {
  phase: SearchPhase,
  last_refresh: Option<Instant>,
  refresh_in_flight: bool,
  stream_statuses: Vec<ProviderStatusSnapshot>,
  /// What the agent last searched for on this row
  query: Option<String>,
}

/// Automatic initial load bookkeeping for the active row
#[derive(Debug, Default)]
struct AutoLoad {
  row_id: Option<RowId>,
  attempted: bool,
  completed: bool,
}

#[derive(Debug, Default)]
struct ReconcilerState {
  rows: HashMap<RowId, RowTracker>,
  auto_load: AutoLoad,
  providers: BTreeSet<String>,
  /// The current chat turn asked for a new row; searches without a row id wait for it
  expect_new_row: bool,
  pending_search: Option<String>,
}

impl ReconcilerState {
  fn tracker(&mut self, row_id: RowId) -> &mut RowTracker {
    self.rows.entry(row_id).or_default()
  }

  fn mark_auto_load_completed(&mut self, row_id: RowId) {
    if self.auto_load.row_id == Some(row_id) {
      self.auto_load.attempted = true;
      self.auto_load.completed = true;
    }
  }
}

pub struct SearchReconciler {
  store: Store,
  backend: Arc<dyn ShoppingBackend>,
  config: SearchConfig,
  state: Mutex<ReconcilerState>,
}

/// Clears the in-flight flag even if the refresh future is dropped mid-request
struct InFlightGuard<'a> {
  reconciler: &'a SearchReconciler,
  row_id: RowId,
}

impl Drop for InFlightGuard<'_> {
  fn drop(&mut self) {
    let mut state = self.reconciler.state();
    state.tracker(self.row_id).refresh_in_flight = false;
    state.mark_auto_load_completed(self.row_id);
  }
}

impl SearchReconciler {
  pub fn new(store: Store, backend: Arc<dyn ShoppingBackend>, config: SearchConfig) -> Self {
    let providers = config.default_providers.iter().cloned().collect();
    Self {
      store,
      backend,
      config,
      state: Mutex::new(ReconcilerState { providers, ..ReconcilerState::default() }),
    }
  }

  fn state(&self) -> MutexGuard<'_, ReconcilerState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn store(&self) -> &Store {
    &self.store
  }

  pub fn phase(&self, row_id: RowId) -> SearchPhase {
    self.state().rows.get(&row_id).map(|tracker| tracker.phase).unwrap_or_default()
  }

  pub fn last_query(&self, row_id: RowId) -> Option<String> {
    self.state().rows.get(&row_id).and_then(|tracker| tracker.query.clone())
  }

  pub fn providers(&self) -> Vec<String> {
    self.state().providers.iter().cloned().collect()
  }

  /// Called before a chat turn's events arrive
  pub fn begin_turn(&self, expect_new_row: bool) {
    let mut state = self.state();
    state.expect_new_row = expect_new_row;
    state.pending_search = None;
  }

  // Chat stream
  // ===========

  /// Apply events in arrival order until the stream ends. A transport error
  /// ends the turn like an `error` event would.
  pub async fn consume_chat_stream(&self, mut stream: ChatEventStream) -> Vec<ChatNotice> {
    let mut notices = Vec::new();

    while let Some(item) = stream.next().await {
      let event = match item {
        Ok(event) => event,
        Err(err) => {
          tracing::warn!(error = %err, "chat stream failed");
          ChatEvent::Error { message: err.to_string() }
        }
      };
      let finished = matches!(event, ChatEvent::Done | ChatEvent::Error { .. });

      if let Some(notice) = self.apply_chat_event(event) {
        notices.push(notice);
      }
      if finished {
        break;
      }
    }

    // Streams that end without `done` still release their rows
    self.settle_open_streams();
    notices
  }

  pub fn apply_chat_event(&self, event: ChatEvent) -> Option<ChatNotice> {
    match event {
      ChatEvent::ActionStarted(action) => {
        self.apply_action(action);
        None
      }
      ChatEvent::RowCreated { row } => {
        self.apply_row_created(row);
        None
      }
      ChatEvent::RowUpdated { row } | ChatEvent::FactorsUpdated { row } => {
        self.apply_row_update(row);
        None
      }
      ChatEvent::SearchResults(batch) => {
        self.apply_search_batch(batch);
        None
      }
      ChatEvent::VendorsLoaded { row_id, category, vendors } => {
        tracing::debug!(row_id, category = ?category, count = vendors.len(), "vendors loaded");
        self.store.merge_row_results(row_id, vendors);
        self.complete_stream(row_id, None);
        None
      }
      ChatEvent::AssistantMessage { text } => Some(ChatNotice::Assistant(text)),
      ChatEvent::NeedsClarification(clarification) => Some(ChatNotice::Clarification(clarification.prompt())),
      ChatEvent::Disambiguate(disambiguation) => Some(ChatNotice::Disambiguate(disambiguation)),
      ChatEvent::VendorOutreach(outreach) => {
        tracing::debug!(row_id = outreach.row_id, category = ?outreach.category, "vendor outreach started");
        Some(ChatNotice::VendorOutreach(outreach))
      }
      ChatEvent::Error { message } => {
        self.fail_open_streams(&message);
        Some(ChatNotice::Error(message))
      }
      ChatEvent::Done => {
        self.settle_open_streams();
        None
      }
    }
  }

  fn apply_action(&self, action: ActionStarted) {
    match action {
      ActionStarted::Search { row_id, query } => {
        let target = row_id.or_else(|| {
          let state = self.state();
          if state.expect_new_row {
            None
          } else {
            self.store.active_row_id()
          }
        });

        match target {
          Some(row_id) => {
            self.open_stream(row_id);
            self.state().tracker(row_id).query = Some(query).filter(|query| !query.trim().is_empty());
          }
          None => {
            tracing::debug!(query = %query, "search waiting for its row");
            self.state().pending_search = Some(query);
          }
        }
      }
      ActionStarted::FetchVendors { row_id, .. } => self.open_stream(row_id),
      ActionStarted::CreateRow { .. }
      | ActionStarted::UpdateRow { .. }
      | ActionStarted::VendorOutreach
      | ActionStarted::Other => {}
    }
  }

  /// Lock first, then reset the visible search state
  fn open_stream(&self, row_id: RowId) {
    self.store.begin_stream(row_id);
    self.store.set_search_error(row_id, None);

    let mut state = self.state();
    let tracker = state.tracker(row_id);
    tracker.phase = SearchPhase::Searching;
    tracker.stream_statuses.clear();
  }

  fn apply_row_created(&self, row: Row) {
    let row_id = row.id;
    self.store.upsert_row(row);
    // A search follows; lock before activation can look at the row
    self.store.begin_stream(row_id);
    {
      let mut state = self.state();
      state.auto_load = AutoLoad { row_id: Some(row_id), attempted: true, completed: false };
      state.expect_new_row = false;
      let pending = state.pending_search.take();
      if let Some(query) = &pending {
        tracing::debug!(row_id, query = %query, "attaching pending search to new row");
      }
      let tracker = state.tracker(row_id);
      tracker.phase = SearchPhase::Searching;
      tracker.stream_statuses.clear();
      if pending.is_some() {
        tracker.query = pending;
      }
    }
    self.store.set_active_row_id(Some(row_id));
  }

  fn apply_row_update(&self, row: Row) {
    if !self.store.update_row(row.id, &RowPatch::from_row(&row)) {
      self.store.upsert_row(row);
    }
  }

  fn apply_search_batch(&self, batch: SearchBatch) {
    let SearchBatch { row_id, results, provider_statuses, more_incoming, user_message, provider } = batch;

    // The backend forwards its search-complete signal as a trailing empty batch
    // after the last provider already closed the stream. Only its message applies.
    if !more_incoming && results.is_empty() && provider_statuses.is_empty() && !self.phase(row_id).is_open() {
      self.apply_late_message(row_id, user_message);
      return;
    }

    if !self.store.is_stream_locked(row_id) && more_incoming {
      self.store.begin_stream(row_id);
    }

    let appended = self.store.merge_row_results(row_id, results);
    tracing::debug!(row_id, provider = ?provider, appended, more_incoming, "search batch");

    {
      let mut state = self.state();
      let tracker = state.tracker(row_id);
      for snapshot in provider_statuses {
        match tracker.stream_statuses.iter_mut().find(|existing| existing.provider_id == snapshot.provider_id) {
          Some(existing) => *existing = snapshot,
          None => tracker.stream_statuses.push(snapshot),
        }
      }
      if more_incoming {
        tracker.phase = SearchPhase::StreamingResults;
      }
    }

    if !more_incoming {
      self.complete_stream(row_id, user_message);
    }
  }

  fn complete_stream(&self, row_id: RowId, user_message: Option<String>) {
    let statuses = {
      let mut state = self.state();
      state.mark_auto_load_completed(row_id);
      std::mem::take(&mut state.tracker(row_id).stream_statuses)
    };

    let offer_count = self.store.offers(row_id).len();
    let message = user_message.or_else(|| {
      if statuses.is_empty() {
        None
      } else {
        determine_search_user_message(offer_count, &statuses)
      }
    });

    self.store.set_provider_statuses(row_id, statuses);
    self.store.set_search_error(row_id, message.clone());
    self.store.end_stream(row_id);

    let phase = if message.is_some() { SearchPhase::Error } else { SearchPhase::Settled };
    self.state().tracker(row_id).phase = phase;
  }

  fn apply_late_message(&self, row_id: RowId, user_message: Option<String>) {
    let Some(message) = user_message else {
      return;
    };
    tracing::debug!(row_id, message = %message, "search finished with a message");
    self.store.set_search_error(row_id, Some(message));
    self.state().tracker(row_id).phase = SearchPhase::Error;
  }

  fn open_rows(&self) -> Vec<RowId> {
    self
      .state()
      .rows
      .iter()
      .filter(|(_, tracker)| tracker.phase.is_open())
      .map(|(row_id, _)| *row_id)
      .collect()
  }

  fn settle_open_streams(&self) {
    for row_id in self.open_rows() {
      self.complete_stream(row_id, None);
    }
    let mut state = self.state();
    state.pending_search = None;
    state.expect_new_row = false;
  }

  fn fail_open_streams(&self, message: &str) {
    for row_id in self.open_rows() {
      self.store.end_stream(row_id);
      self.store.set_search_error(row_id, Some(message.to_string()));
      let mut state = self.state();
      state.mark_auto_load_completed(row_id);
      let tracker = state.tracker(row_id);
      tracker.phase = SearchPhase::Error;
      tracker.stream_statuses.clear();
    }
    let mut state = self.state();
    state.pending_search = None;
    state.expect_new_row = false;
  }

  // Direct search
  // =============

  pub async fn refresh(&self, row_id: RowId, mode: RefreshMode) -> RefreshOutcome {
    let now = Instant::now();
    let locked = self.store.is_stream_locked(row_id);
    let providers = {
      let mut state = self.state();
      let enabled: Vec<String> = state.providers.iter().cloned().collect();
      let tracker = state.tracker(row_id);

      if tracker.refresh_in_flight {
        tracing::debug!(row_id, "refresh already in flight");
        return RefreshOutcome::InFlight;
      }
      if let Some(last) = tracker.last_refresh {
        if now.duration_since(last) < self.config.refresh_cooldown() {
          tracing::debug!(row_id, "refresh cooling down");
          return RefreshOutcome::CoolingDown;
        }
      }

      tracker.last_refresh = Some(now);
      tracker.refresh_in_flight = true;
      if !locked {
        tracker.phase = SearchPhase::Searching;
      }

      match mode {
        RefreshMode::All => enabled,
        RefreshMode::Providers(ids) => ids,
      }
    };
    let _guard = InFlightGuard { reconciler: self, row_id };

    self.store.set_search_error(row_id, None);
    let request =
      SearchRequest { query: None, providers: if providers.is_empty() { None } else { Some(providers) } };

    match self.backend.search(row_id, &request).await {
      Ok(response) => self.apply_refresh(row_id, response),
      Err(err) => {
        tracing::warn!(row_id, error = %err, "search refresh failed");
        self.store.set_search_error(row_id, Some(SEARCH_UNAVAILABLE_MESSAGE.to_string()));
        self.finish_refresh(row_id, SearchPhase::Error);
      }
    }

    RefreshOutcome::Issued
  }

  fn apply_refresh(&self, row_id: RowId, response: SearchResponse) {
    let SearchResponse { results, provider_statuses, user_message } = response;
    let results = dedupe_offers(results);
    let has_results = !results.is_empty();

    if has_results {
      self.place_refresh_results(row_id, results);
    }

    self.store.set_provider_statuses(row_id, provider_statuses);
    let phase = if user_message.is_some() && !has_results { SearchPhase::Error } else { SearchPhase::Settled };
    self.store.set_search_error(row_id, user_message);
    self.finish_refresh(row_id, phase);
  }

  /// Wholesale replace, unless a stream is delivering into the row
  fn place_refresh_results(&self, row_id: RowId, results: Vec<Offer>) {
    if self.store.is_stream_locked(row_id) {
      self.store.merge_row_results(row_id, results);
      return;
    }

    let existing = self.store.offers(row_id);
    let mut merged = results;
    // Keep local interaction state for offers the refresh returned again
    for (index, offer) in merged.iter_mut().enumerate() {
      let key = offer.key(index);
      if let Some(previous) =
        existing.iter().enumerate().find(|(position, candidate)| candidate.key(*position) == key)
      {
        let mut kept = previous.1.clone();
        kept.absorb(offer.clone());
        *offer = kept;
      }
    }
    self.store.set_row_results(row_id, merged, None);
  }

  fn finish_refresh(&self, row_id: RowId, phase: SearchPhase) {
    if self.store.is_stream_locked(row_id) {
      return;
    }
    self.store.set_more_incoming(row_id, false);
    self.state().tracker(row_id).phase = phase;
  }

  /// Make `row_id` active, loading it once if it has nothing to show yet
  pub async fn activate_row(&self, row_id: RowId) -> bool {
    self.store.set_active_row_id(Some(row_id));

    let should_load = {
      let mut state = self.state();
      if state.auto_load.row_id != Some(row_id) {
        state.auto_load = AutoLoad { row_id: Some(row_id), ..AutoLoad::default() };
      }

      if state.auto_load.attempted {
        false
      } else {
        state.auto_load.attempted = true;
        let in_flight = state.rows.get(&row_id).is_some_and(|tracker| tracker.refresh_in_flight);
        let locked = self.store.is_stream_locked(row_id);
        let has_offers = !self.store.offers(row_id).is_empty();

        if has_offers {
          state.auto_load.completed = true;
        }
        !(has_offers || locked || in_flight)
      }
    };

    if !should_load {
      return false;
    }

    tracing::debug!(row_id, "auto-loading row");
    let outcome = self.refresh(row_id, RefreshMode::All).await;
    self.state().mark_auto_load_completed(row_id);
    outcome == RefreshOutcome::Issued
  }

  /// Enable or disable a provider. Re-searches the active row when it has
  /// finished loading and nothing else is running; otherwise the change is
  /// only recorded. Returns true when a refresh was issued.
  pub async fn toggle_provider(&self, provider: &str, enabled: bool) -> bool {
    let active = self.store.active_row_id();
    let target = {
      let mut state = self.state();
      let changed = if enabled {
        state.providers.insert(provider.to_string())
      } else {
        state.providers.remove(provider)
      };
      if !changed {
        return false;
      }

      let loaded = state.auto_load.completed && state.auto_load.row_id == active;
      active.filter(|row_id| {
        let in_flight = state.rows.get(row_id).is_some_and(|tracker| tracker.refresh_in_flight);
        loaded && !in_flight && !self.store.is_stream_locked(*row_id)
      })
    };

    match target {
      Some(row_id) => self.refresh(row_id, RefreshMode::All).await == RefreshOutcome::Issued,
      None => false,
    }
  }
}
