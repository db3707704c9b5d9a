//! User-facing copy for searches that came back empty

use crate::offer::{ProviderStatus, ProviderStatusSnapshot};

pub const QUOTA_EXHAUSTED_MESSAGE: &str =
  "Search providers have exhausted their quota. Please try again later or contact support.";
pub const RATE_LIMITED_MESSAGE: &str =
  "Search is temporarily rate-limited. Please wait a moment and try again.";
pub const SEARCH_UNAVAILABLE_MESSAGE: &str = "Unable to search at this time. Please try again later.";

/// Message explaining why a search yielded nothing, if the provider statuses explain it
pub fn determine_search_user_message(
  result_count: usize,
  statuses: &[ProviderStatusSnapshot],
) -> Option<String> {
  if result_count > 0 {
    return None;
  }

  let has = |status: ProviderStatus| statuses.iter().any(|snapshot| snapshot.status == status);

  if !statuses.is_empty() && statuses.iter().all(|snapshot| snapshot.status == ProviderStatus::Exhausted) {
    return Some(QUOTA_EXHAUSTED_MESSAGE.to_string());
  }

  if has(ProviderStatus::RateLimited) {
    return Some(RATE_LIMITED_MESSAGE.to_string());
  }

  if !has(ProviderStatus::Ok) {
    return Some(SEARCH_UNAVAILABLE_MESSAGE.to_string());
  }

  None
}
