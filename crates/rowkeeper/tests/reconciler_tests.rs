
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use mock_backend::{offer, search_response, MockBackend};
use rowkeeper::backend::SearchResponse;
use rowkeeper::config::SearchConfig;
use rowkeeper::events::{ActionStarted, SearchBatch};
use rowkeeper::messaging::{QUOTA_EXHAUSTED_MESSAGE, RATE_LIMITED_MESSAGE, SEARCH_UNAVAILABLE_MESSAGE};
use rowkeeper::reconciler::ChatNotice;
use rowkeeper::{
  BackendError, BackendResult, ChatEvent, ProviderStatus, ProviderStatusSnapshot, RefreshMode, RefreshOutcome, Row,
  SearchPhase, SearchReconciler, Store,
};

fn setup() -> (Store, Arc<MockBackend>, SearchReconciler) {
  let store = Store::new();
  store.set_rows(vec![Row::new(1, "blue hoodie"), Row::new(2, "desk lamp")]);
  let backend = Arc::new(MockBackend::new());
  let reconciler = SearchReconciler::new(store.clone(), backend.clone(), SearchConfig::default());
  (store, backend, reconciler)
}

fn batch(row_id: i64, offers: Vec<rowkeeper::Offer>, more_incoming: bool) -> ChatEvent {
  ChatEvent::SearchResults(SearchBatch {
    row_id,
    results: offers,
    provider_statuses: Vec::new(),
    more_incoming,
    user_message: None,
    provider: Some("amazon".to_string()),
  })
}

fn start_search(row_id: Option<i64>) -> ChatEvent {
  ChatEvent::ActionStarted(ActionStarted::Search { row_id, query: "hoodie".to_string() })
}

#[tokio::test(start_paused = true)]
async fn test_refresh_does_not_clobber_stream() {
  let (store, backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(1)));
  reconciler.apply_chat_event(batch(1, vec![offer(1, "A"), offer(2, "B"), offer(3, "C")], true));

  backend.queue_search(Ok(SearchResponse {
    results: Vec::new(),
    provider_statuses: vec![ProviderStatusSnapshot::new("amazon", ProviderStatus::RateLimited, 0)],
    user_message: Some(RATE_LIMITED_MESSAGE.to_string()),
  }));
  assert_eq!(reconciler.refresh(1, RefreshMode::All).await, RefreshOutcome::Issued);

  let results = store.row_results(1);
  assert_eq!(results.offers.len(), 3);
  assert_eq!(results.search_error.as_deref(), Some(RATE_LIMITED_MESSAGE));
  assert!(results.streaming_lock);
  assert!(results.more_incoming);
}

#[tokio::test(start_paused = true)]
async fn test_non_empty_refresh_merges_into_locked_row() {
  let (store, backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(1)));
  reconciler.apply_chat_event(batch(1, vec![offer(1, "A")], true));
  backend.queue_search(Ok(search_response(vec![offer(1, "A"), offer(4, "D")])));

  reconciler.refresh(1, RefreshMode::All).await;

  let titles: Vec<String> = store.offers(1).into_iter().map(|offer| offer.title).collect();
  assert_eq!(titles, vec!["A", "D"]);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_enforced() {
  let (_store, backend, reconciler) = setup();

  assert_eq!(reconciler.refresh(1, RefreshMode::All).await, RefreshOutcome::Issued);
  assert_eq!(reconciler.refresh(1, RefreshMode::All).await, RefreshOutcome::CoolingDown);
  assert_eq!(backend.search_call_count(), 1);

  tokio::time::advance(Duration::from_millis(5_001)).await;

  assert_eq!(reconciler.refresh(1, RefreshMode::All).await, RefreshOutcome::Issued);
  assert_eq!(backend.search_call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_is_per_row() {
  let (_store, backend, reconciler) = setup();

  reconciler.refresh(1, RefreshMode::All).await;
  assert_eq!(reconciler.refresh(2, RefreshMode::All).await, RefreshOutcome::Issued);
  assert_eq!(backend.search_call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_refresh_reports_in_flight() {
  let (_store, backend, reconciler) = setup();
  *backend.search_delay.lock().unwrap() = Some(Duration::from_secs(1));

  let (first, second) =
    tokio::join!(reconciler.refresh(1, RefreshMode::All), reconciler.refresh(1, RefreshMode::All));

  assert_eq!(first, RefreshOutcome::Issued);
  assert_eq!(second, RefreshOutcome::InFlight);
  assert_eq!(backend.search_call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_sets_generic_message() {
  let (store, backend, reconciler) = setup();
  backend.queue_search(Err(BackendError::transport("connection reset")));

  assert_eq!(reconciler.refresh(1, RefreshMode::All).await, RefreshOutcome::Issued);

  assert_eq!(store.row_results(1).search_error.as_deref(), Some(SEARCH_UNAVAILABLE_MESSAGE));
  assert_eq!(reconciler.phase(1), SearchPhase::Error);
}

#[tokio::test(start_paused = true)]
async fn test_unlocked_refresh_replaces_wholesale() {
  let (store, backend, reconciler) = setup();
  store.set_row_results(1, vec![offer(1, "old")], None);
  backend.queue_search(Ok(search_response(vec![offer(2, "new")])));

  reconciler.refresh(1, RefreshMode::Providers(vec!["ebay".to_string()])).await;

  let offers = store.offers(1);
  assert_eq!(offers.len(), 1);
  assert_eq!(offers[0].title, "new");
  assert_eq!(reconciler.phase(1), SearchPhase::Settled);

  let calls = backend.search_calls.lock().unwrap();
  assert_eq!(calls[0].1.providers, Some(vec!["ebay".to_string()]));
}

#[tokio::test(start_paused = true)]
async fn test_stream_completion_replaces_statuses_and_unlocks() {
  let (store, _backend, reconciler) = setup();
  store.set_provider_statuses(1, vec![ProviderStatusSnapshot::new("stale", ProviderStatus::Error, 0)]);

  reconciler.apply_chat_event(start_search(Some(1)));
  assert_eq!(reconciler.phase(1), SearchPhase::Searching);

  reconciler.apply_chat_event(ChatEvent::SearchResults(SearchBatch {
    row_id: 1,
    results: vec![offer(1, "A")],
    provider_statuses: vec![ProviderStatusSnapshot::new("amazon", ProviderStatus::Ok, 1)],
    more_incoming: true,
    user_message: None,
    provider: Some("amazon".to_string()),
  }));
  assert_eq!(reconciler.phase(1), SearchPhase::StreamingResults);

  reconciler.apply_chat_event(ChatEvent::SearchResults(SearchBatch {
    row_id: 1,
    results: vec![offer(2, "B")],
    provider_statuses: vec![ProviderStatusSnapshot::new("ebay", ProviderStatus::Timeout, 0)],
    more_incoming: false,
    user_message: None,
    provider: Some("ebay".to_string()),
  }));

  let results = store.row_results(1);
  let providers: Vec<&str> = results.provider_statuses.iter().map(|s| s.provider_id.as_str()).collect();
  assert_eq!(providers, vec!["amazon", "ebay"]);
  assert_eq!(results.offers.len(), 2);
  assert!(!results.streaming_lock);
  assert!(!results.more_incoming);
  assert_eq!(results.search_error, None);
  assert_eq!(reconciler.phase(1), SearchPhase::Settled);
}

#[tokio::test(start_paused = true)]
async fn test_empty_stream_derives_message_from_statuses() {
  let (store, _backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(2)));
  reconciler.apply_chat_event(ChatEvent::SearchResults(SearchBatch {
    row_id: 2,
    results: Vec::new(),
    provider_statuses: vec![
      ProviderStatusSnapshot::new("amazon", ProviderStatus::Exhausted, 0),
      ProviderStatusSnapshot::new("ebay", ProviderStatus::Exhausted, 0),
    ],
    more_incoming: false,
    user_message: None,
    provider: None,
  }));

  assert_eq!(store.row_results(2).search_error.as_deref(), Some(QUOTA_EXHAUSTED_MESSAGE));
  assert_eq!(reconciler.phase(2), SearchPhase::Error);
}

fn provider_batch(row_id: i64, provider: &str, status: ProviderStatus, more_incoming: bool) -> ChatEvent {
  ChatEvent::SearchResults(SearchBatch {
    row_id,
    results: Vec::new(),
    provider_statuses: vec![ProviderStatusSnapshot::new(provider, status, 0)],
    more_incoming,
    user_message: None,
    provider: Some(provider.to_string()),
  })
}

#[tokio::test(start_paused = true)]
async fn test_trailing_complete_batch_keeps_statuses() {
  let (store, _backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(1)));
  reconciler.apply_chat_event(provider_batch(1, "amazon", ProviderStatus::Exhausted, true));
  reconciler.apply_chat_event(provider_batch(1, "ebay", ProviderStatus::Exhausted, false));
  reconciler.apply_chat_event(ChatEvent::SearchResults(SearchBatch {
    row_id: 1,
    results: Vec::new(),
    provider_statuses: Vec::new(),
    more_incoming: false,
    user_message: Some("quota".to_string()),
    provider: None,
  }));

  let results = store.row_results(1);
  assert_eq!(results.provider_statuses.len(), 2);
  assert_eq!(results.search_error.as_deref(), Some("quota"));
  assert!(!results.streaming_lock);
  assert_eq!(reconciler.phase(1), SearchPhase::Error);
}

#[tokio::test(start_paused = true)]
async fn test_trailing_complete_batch_without_message_is_ignored() {
  let (store, _backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(1)));
  reconciler.apply_chat_event(ChatEvent::SearchResults(SearchBatch {
    row_id: 1,
    results: vec![offer(1, "A")],
    provider_statuses: vec![ProviderStatusSnapshot::new("amazon", ProviderStatus::Ok, 1)],
    more_incoming: false,
    user_message: None,
    provider: Some("amazon".to_string()),
  }));
  reconciler.apply_chat_event(batch(1, Vec::new(), false));

  let results = store.row_results(1);
  assert_eq!(results.provider_statuses.len(), 1);
  assert_eq!(results.offers.len(), 1);
  assert_eq!(results.search_error, None);
  assert_eq!(reconciler.phase(1), SearchPhase::Settled);
}

#[tokio::test(start_paused = true)]
async fn test_search_query_is_remembered_per_row() {
  let (_store, _backend, reconciler) = setup();

  reconciler.apply_chat_event(start_search(Some(2)));
  assert_eq!(reconciler.last_query(2).as_deref(), Some("hoodie"));
  assert_eq!(reconciler.last_query(1), None);

  reconciler.begin_turn(true);
  reconciler.apply_chat_event(ChatEvent::ActionStarted(ActionStarted::Search {
    row_id: None,
    query: "trail running shoes".to_string(),
  }));
  reconciler.apply_chat_event(ChatEvent::RowCreated { row: Row::new(3, "running shoes") });

  assert_eq!(reconciler.last_query(3).as_deref(), Some("trail running shoes"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_drops_duplicate_offers() {
  let (store, backend, reconciler) = setup();
  backend.queue_search(Ok(search_response(vec![offer(1, "A"), offer(2, "B"), offer(1, "A again")])));

  reconciler.refresh(1, RefreshMode::All).await;

  let titles: Vec<String> = store.offers(1).into_iter().map(|offer| offer.title).collect();
  assert_eq!(titles, vec!["A", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_new_row_is_not_auto_loaded_twice() {
  let (store, backend, reconciler) = setup();

  reconciler.begin_turn(true);
  reconciler.apply_chat_event(start_search(None));
  reconciler.apply_chat_event(ChatEvent::RowCreated { row: Row::new(9, "running shoes") });

  assert_eq!(store.active_row_id(), Some(9));
  assert!(store.row_results(9).streaming_lock);
  assert!(!reconciler.activate_row(9).await);
  assert_eq!(backend.search_call_count(), 0);

  reconciler.apply_chat_event(batch(9, vec![offer(1, "Trail runner")], false));
  assert_eq!(store.offers(9).len(), 1);
  assert!(!store.row_results(9).streaming_lock);
}

#[tokio::test(start_paused = true)]
async fn test_activation_loads_once() {
  let (_store, backend, reconciler) = setup();

  assert!(reconciler.activate_row(1).await);
  assert!(!reconciler.activate_row(1).await);
  assert_eq!(backend.search_call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_activation_skips_rows_with_offers() {
  let (store, backend, reconciler) = setup();
  store.set_row_results(2, vec![offer(3, "lamp")], None);

  assert!(!reconciler.activate_row(2).await);
  assert_eq!(backend.search_call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_search_without_row_targets_active_row() {
  let (store, _backend, reconciler) = setup();
  store.set_active_row_id(Some(2));

  reconciler.begin_turn(false);
  reconciler.apply_chat_event(start_search(None));

  assert!(store.row_results(2).streaming_lock);
  assert_eq!(reconciler.phase(2), SearchPhase::Searching);
}

#[tokio::test(start_paused = true)]
async fn test_provider_toggle_refreshes_loaded_row() {
  let (_store, backend, reconciler) = setup();
  reconciler.activate_row(1).await;
  tokio::time::advance(Duration::from_secs(6)).await;

  assert!(reconciler.toggle_provider("ebay", false).await);
  assert_eq!(backend.search_call_count(), 2);
  let providers = backend.search_calls.lock().unwrap()[1].1.providers.clone().unwrap();
  assert!(!providers.contains(&"ebay".to_string()));

  // Inside the cooldown the change is recorded but no search is issued
  assert!(!reconciler.toggle_provider("ebay", true).await);
  assert_eq!(backend.search_call_count(), 2);
  assert!(reconciler.providers().contains(&"ebay".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_provider_toggle_coalesced_while_streaming() {
  let (_store, backend, reconciler) = setup();
  reconciler.activate_row(1).await;
  tokio::time::advance(Duration::from_secs(6)).await;
  reconciler.apply_chat_event(start_search(Some(1)));

  assert!(!reconciler.toggle_provider("amazon", false).await);
  assert_eq!(backend.search_call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_event_releases_streaming_rows() {
  let (store, _backend, reconciler) = setup();
  reconciler.apply_chat_event(start_search(Some(1)));

  let notice = reconciler.apply_chat_event(ChatEvent::Error { message: "agent unavailable".to_string() });

  assert_eq!(notice, Some(ChatNotice::Error("agent unavailable".to_string())));
  let results = store.row_results(1);
  assert!(!results.streaming_lock);
  assert!(!results.more_incoming);
  assert_eq!(results.search_error.as_deref(), Some("agent unavailable"));
  assert_eq!(reconciler.phase(1), SearchPhase::Error);
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_without_done_settles_rows() {
  let (store, _backend, reconciler) = setup();
  let events: Vec<BackendResult<ChatEvent>> =
    vec![Ok(start_search(Some(1))), Ok(batch(1, vec![offer(1, "A")], true))];

  let notices = reconciler.consume_chat_stream(futures::stream::iter(events).boxed()).await;

  assert!(notices.is_empty());
  assert!(!store.row_results(1).streaming_lock);
  assert_eq!(reconciler.phase(1), SearchPhase::Settled);
}

#[tokio::test(start_paused = true)]
async fn test_assistant_text_is_forwarded() {
  let (_store, _backend, reconciler) = setup();
  let notice = reconciler.apply_chat_event(ChatEvent::AssistantMessage { text: "On it".to_string() });
  assert_eq!(notice, Some(ChatNotice::Assistant("On it".to_string())));
}
