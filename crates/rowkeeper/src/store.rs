//! Row/offer store
//!
//! The single shared source of truth for rows, their offers and per-row search
//! state. `Store` is a cheap cloneable handle; every mutation is one short
//! critical section that never spans an `.await`, and writers only ever touch
//! the offers they target, so a slow request can't overwrite data that arrived
//! through another path in the meantime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::offer::{derive_offer_key, Offer, OfferPatch, ProviderStatusSnapshot};
use crate::row::{Row, RowId, RowPatch};

const EVENT_CAPACITY: usize = 256;

/// Search state and offers for one row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowResults {
  pub offers: Vec<Offer>,
  pub provider_statuses: Vec<ProviderStatusSnapshot>,
  pub search_error: Option<String>,
  /// More batches are expected; render a "fetching more" placeholder
  pub more_incoming: bool,
  /// A chat-driven search is delivering results for this row
  pub streaming_lock: bool,
}

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
  RowsReplaced,
  RowChanged(RowId),
  RowRemoved(RowId),
  ActiveRowChanged(Option<RowId>),
  ResultsChanged(RowId),
  SearchStateChanged(RowId),
}

#[derive(Debug, Default)]
struct StoreState {
  rows: Vec<Row>,
  results: HashMap<RowId, RowResults>,
  active_row_id: Option<RowId>,
}

#[derive(Clone)]
pub struct Store {
  state: Arc<Mutex<StoreState>>,
  events: broadcast::Sender<StoreEvent>,
}

impl Default for Store {
  fn default() -> Self {
    Self::new()
  }
}

impl Store {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self { state: Arc::new(Mutex::new(StoreState::default())), events }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
    self.events.subscribe()
  }

  fn lock(&self) -> MutexGuard<'_, StoreState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn notify(&self, event: StoreEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  // Rows
  // ====

  pub fn set_rows(&self, rows: Vec<Row>) {
    let active_cleared = {
      let mut state = self.lock();
      state.results.retain(|id, _| rows.iter().any(|row| row.id == *id));
      let active_cleared = match state.active_row_id {
        Some(active) if !rows.iter().any(|row| row.id == active) => {
          state.active_row_id = None;
          true
        }
        _ => false,
      };
      state.rows = rows;
      active_cleared
    };

    self.notify(StoreEvent::RowsReplaced);
    if active_cleared {
      self.notify(StoreEvent::ActiveRowChanged(None));
    }
  }

  /// Insert a row, or refresh every field of an existing one in place
  pub fn upsert_row(&self, row: Row) {
    let id = row.id;
    {
      let mut state = self.lock();
      match state.rows.iter_mut().find(|existing| existing.id == id) {
        Some(existing) => RowPatch::from_row(&row).apply(existing),
        None => state.rows.push(row),
      }
    }
    self.notify(StoreEvent::RowChanged(id));
  }

  pub fn update_row(&self, id: RowId, patch: &RowPatch) -> bool {
    let updated = {
      let mut state = self.lock();
      match state.rows.iter_mut().find(|row| row.id == id) {
        Some(row) => {
          patch.apply(row);
          true
        }
        None => false,
      }
    };

    if updated {
      self.notify(StoreEvent::RowChanged(id));
    }
    updated
  }

  pub fn rows(&self) -> Vec<Row> {
    self.lock().rows.clone()
  }

  pub fn row(&self, id: RowId) -> Option<Row> {
    self.lock().rows.iter().find(|row| row.id == id).cloned()
  }

  pub fn contains_row(&self, id: RowId) -> bool {
    self.lock().rows.iter().any(|row| row.id == id)
  }

  pub fn set_active_row_id(&self, id: Option<RowId>) {
    let changed = {
      let mut state = self.lock();
      let changed = state.active_row_id != id;
      state.active_row_id = id;
      changed
    };
    if changed {
      self.notify(StoreEvent::ActiveRowChanged(id));
    }
  }

  pub fn active_row_id(&self) -> Option<RowId> {
    self.lock().active_row_id
  }

  pub fn active_row(&self) -> Option<Row> {
    let state = self.lock();
    let id = state.active_row_id?;
    state.rows.iter().find(|row| row.id == id).cloned()
  }

  /// Remove a row from the listing, keeping its results. Returns the row and its position.
  pub fn detach_row(&self, id: RowId) -> Option<(Row, usize)> {
    let (detached, active_cleared) = {
      let mut state = self.lock();
      let position = state.rows.iter().position(|row| row.id == id)?;
      let row = state.rows.remove(position);
      let active_cleared = state.active_row_id == Some(id);
      if active_cleared {
        state.active_row_id = None;
      }
      ((row, position), active_cleared)
    };

    self.notify(StoreEvent::RowRemoved(id));
    if active_cleared {
      self.notify(StoreEvent::ActiveRowChanged(None));
    }
    Some(detached)
  }

  /// Put a detached row back at its previous position (clamped to the current length)
  pub fn restore_row(&self, row: Row, position: usize) {
    let id = row.id;
    {
      let mut state = self.lock();
      if state.rows.iter().any(|existing| existing.id == id) {
        return;
      }
      let position = position.min(state.rows.len());
      state.rows.insert(position, row);
    }
    self.notify(StoreEvent::RowChanged(id));
  }

  pub fn drop_row_results(&self, id: RowId) {
    self.lock().results.remove(&id);
    self.notify(StoreEvent::ResultsChanged(id));
  }

  // Offers
  // ======

  /// Replace a row's offers wholesale. Refuses an empty list while the row is
  /// stream-locked, since that would erase offers the stream already delivered.
  pub fn set_row_results(
    &self,
    row_id: RowId,
    offers: Vec<Offer>,
    provider_statuses: Option<Vec<ProviderStatusSnapshot>>,
  ) -> bool {
    {
      let mut state = self.lock();
      let results = state.results.entry(row_id).or_default();
      if offers.is_empty() && results.streaming_lock {
        tracing::warn!(row_id, "ignoring empty result set while a stream is in flight");
        return false;
      }
      results.offers = offers;
      if let Some(statuses) = provider_statuses {
        results.provider_statuses = statuses;
      }
    }
    self.notify(StoreEvent::ResultsChanged(row_id));
    true
  }

  /// Append a batch in arrival order. Offers already present (same key) are
  /// refreshed in place. Returns how many new offers were appended.
  pub fn merge_row_results(&self, row_id: RowId, incoming: Vec<Offer>) -> usize {
    if incoming.is_empty() {
      return 0;
    }

    let appended = {
      let mut state = self.lock();
      let results = state.results.entry(row_id).or_default();
      let mut positions: HashMap<String, usize> = results
        .offers
        .iter()
        .enumerate()
        .map(|(index, offer)| (derive_offer_key(offer, index), index))
        .collect();

      let mut appended = 0;
      for offer in incoming {
        let key = derive_offer_key(&offer, results.offers.len());
        match positions.get(&key) {
          Some(&index) => results.offers[index].absorb(offer),
          None => {
            positions.insert(key, results.offers.len());
            results.offers.push(offer);
            appended += 1;
          }
        }
      }
      appended
    };

    self.notify(StoreEvent::ResultsChanged(row_id));
    appended
  }

  /// Targeted mutation: merge `patch` into every offer of the row matching
  /// `predicate` (called with the offer and its position). Other offers are
  /// never touched. Returns the number of offers updated.
  pub fn update_row_offer<P>(&self, row_id: RowId, predicate: P, patch: &OfferPatch) -> usize
  where
    P: Fn(&Offer, usize) -> bool,
  {
    let updated = {
      let mut state = self.lock();
      let Some(results) = state.results.get_mut(&row_id) else {
        return 0;
      };
      let mut updated = 0;
      for (index, offer) in results.offers.iter_mut().enumerate() {
        if predicate(offer, index) {
          patch.apply(offer);
          updated += 1;
        }
      }
      updated
    };

    if updated > 0 {
      self.notify(StoreEvent::ResultsChanged(row_id));
    }
    updated
  }

  /// Offer with the given key, with its position
  pub fn find_offer(&self, row_id: RowId, key: &str) -> Option<(usize, Offer)> {
    let state = self.lock();
    state
      .results
      .get(&row_id)?
      .offers
      .iter()
      .enumerate()
      .find(|(index, offer)| derive_offer_key(offer, *index) == key)
      .map(|(index, offer)| (index, offer.clone()))
  }

  pub fn offers(&self, row_id: RowId) -> Vec<Offer> {
    self.lock().results.get(&row_id).map(|results| results.offers.clone()).unwrap_or_default()
  }

  pub fn row_results(&self, row_id: RowId) -> RowResults {
    self.lock().results.get(&row_id).cloned().unwrap_or_default()
  }

  // Search state
  // ============

  /// Replace provider statuses wholesale; snapshots are never merged
  pub fn set_provider_statuses(&self, row_id: RowId, statuses: Vec<ProviderStatusSnapshot>) {
    self.lock().results.entry(row_id).or_default().provider_statuses = statuses;
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  pub fn set_search_error(&self, row_id: RowId, message: Option<String>) {
    self.lock().results.entry(row_id).or_default().search_error = message;
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  pub fn set_more_incoming(&self, row_id: RowId, more_incoming: bool) {
    self.lock().results.entry(row_id).or_default().more_incoming = more_incoming;
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  pub fn set_streaming_lock(&self, row_id: RowId, locked: bool) {
    self.lock().results.entry(row_id).or_default().streaming_lock = locked;
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  /// Raise `more_incoming` and the streaming lock together
  pub fn begin_stream(&self, row_id: RowId) {
    {
      let mut state = self.lock();
      let results = state.results.entry(row_id).or_default();
      results.more_incoming = true;
      results.streaming_lock = true;
    }
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  pub fn end_stream(&self, row_id: RowId) {
    {
      let mut state = self.lock();
      let results = state.results.entry(row_id).or_default();
      results.more_incoming = false;
      results.streaming_lock = false;
    }
    self.notify(StoreEvent::SearchStateChanged(row_id));
  }

  pub fn is_stream_locked(&self, row_id: RowId) -> bool {
    self.lock().results.get(&row_id).is_some_and(|results| results.streaming_lock)
  }
}
