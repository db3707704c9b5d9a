//! Offer model and identity keys
//!
//! Offers arrive from several places (direct search, the chat stream, vendor
//! lookups) and often more than once. Every offer gets a key that stays the
//! same across repeated fetches of the same underlying item, which is what the
//! store uses to merge streamed batches without duplicating tiles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

pub type BidId = i64;
pub type QuoteId = i64;

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
  Ok,
  Timeout,
  RateLimited,
  Exhausted,
  Error,
}

/// Outcome of one provider for one search invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatusSnapshot {
  pub provider_id: String,
  pub status: ProviderStatus,
  #[serde(default)]
  pub result_count: u32,
  #[serde(default)]
  pub latency_ms: Option<u64>,
  #[serde(default)]
  pub message: Option<String>,
}

impl ProviderStatusSnapshot {
  pub fn new(provider_id: impl Into<String>, status: ProviderStatus, result_count: u32) -> Self {
    Self { provider_id: provider_id.into(), status, result_count, latency_ms: None, message: None }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
  #[serde(default)]
  pub bid_id: Option<BidId>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub price: Option<f64>,
  #[serde(default = "default_currency")]
  pub currency: String,
  #[serde(default)]
  pub merchant: String,
  #[serde(default)]
  pub merchant_domain: Option<String>,
  #[serde(default)]
  pub url: Option<String>,
  /// Fallback link, usually the clickout wrapper
  #[serde(default)]
  pub click_url: Option<String>,
  #[serde(default)]
  pub image_url: Option<String>,
  #[serde(default)]
  pub match_score: Option<f64>,
  #[serde(default)]
  pub is_selected: bool,
  #[serde(default)]
  pub is_liked: bool,
  #[serde(default)]
  pub liked_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub comment_preview: Option<String>,
  #[serde(default)]
  pub source: String,
  #[serde(default)]
  pub is_service_provider: bool,
  #[serde(default)]
  pub quote_id: Option<QuoteId>,
  #[serde(default)]
  pub rating: Option<f64>,
  #[serde(default)]
  pub reviews_count: Option<u32>,
  #[serde(default)]
  pub shipping_info: Option<String>,
}

fn default_currency() -> String {
  DEFAULT_CURRENCY.to_string()
}

impl Default for Offer {
  fn default() -> Self {
    Self {
      bid_id: None,
      title: String::new(),
      price: None,
      currency: default_currency(),
      merchant: String::new(),
      merchant_domain: None,
      url: None,
      click_url: None,
      image_url: None,
      match_score: None,
      is_selected: false,
      is_liked: false,
      liked_at: None,
      comment_preview: None,
      source: String::new(),
      is_service_provider: false,
      quote_id: None,
      rating: None,
      reviews_count: None,
      shipping_info: None,
    }
  }
}

impl Offer {
  /// Normalize a raw search hit. Accepts persisted bids (`id`, `item_title`,
  /// `item_url`) as well as provider results (`title`, `url`, `merchant_name`).
  pub fn from_raw(raw: &Value) -> Self {
    let liked_at = str_field(raw, &["liked_at"])
      .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
      .map(|value| value.with_timezone(&Utc));

    Self {
      bid_id: i64_field(raw, &["bid_id", "id"]),
      title: str_field(raw, &["title", "item_title", "name"]).unwrap_or_default(),
      price: f64_field(raw, &["price", "total_cost"]),
      currency: str_field(raw, &["currency"]).unwrap_or_else(default_currency),
      merchant: str_field(raw, &["merchant", "merchant_name", "seller", "vendor_company"])
        .unwrap_or_default(),
      merchant_domain: str_field(raw, &["merchant_domain", "domain"]),
      url: str_field(raw, &["url", "item_url", "canonical_url", "website"]),
      click_url: str_field(raw, &["click_url", "clickout_url"]),
      image_url: str_field(raw, &["image_url", "image", "thumbnail"]),
      match_score: f64_field(raw, &["match_score", "combined_score", "relevance_score"])
        .map(|score| score.clamp(0.0, 1.0)),
      is_selected: bool_field(raw, &["is_selected"]),
      is_liked: bool_field(raw, &["is_liked"]),
      liked_at,
      comment_preview: str_field(raw, &["comment_preview"]),
      source: str_field(raw, &["source", "provider"]).unwrap_or_default(),
      is_service_provider: bool_field(raw, &["is_service_provider"]),
      quote_id: i64_field(raw, &["quote_id"]),
      rating: f64_field(raw, &["rating"]),
      reviews_count: i64_field(raw, &["reviews_count", "review_count"])
        .and_then(|count| u32::try_from(count).ok()),
      shipping_info: str_field(raw, &["shipping_info"]),
    }
  }

  pub fn key(&self, index: usize) -> String {
    derive_offer_key(self, index)
  }

  /// Fold a re-fetched copy of this offer into the local one. Provider data
  /// is refreshed; local interaction state is kept.
  pub fn absorb(&mut self, incoming: Offer) {
    let Offer { is_selected, is_liked, liked_at, comment_preview, bid_id, .. } = self.clone();
    *self = Offer {
      bid_id: bid_id.or(incoming.bid_id),
      is_selected,
      is_liked,
      liked_at,
      comment_preview: comment_preview.or(incoming.comment_preview.clone()),
      ..incoming
    };
  }
}

/// Stable identity for an offer at `index` within its row.
///
/// Priority: persisted bid id, then the merchant URL unwrapped from a clickout
/// link, then any direct http(s)/mailto URL, then a composite fallback that is
/// only unique within one listing.
pub fn derive_offer_key(offer: &Offer, index: usize) -> String {
  if let Some(bid_id) = offer.bid_id {
    return format!("bid:{bid_id}");
  }

  let candidates = [offer.url.as_deref(), offer.click_url.as_deref()];

  for candidate in candidates.iter().flatten() {
    if let Some(target) = unwrap_clickout(candidate) {
      return format!("url:{target}");
    }
  }

  for candidate in candidates.iter().flatten() {
    if is_direct_url(candidate) {
      return candidate.trim().to_string();
    }
  }

  let price = offer.price.map(|price| format!("{price:.2}")).unwrap_or_default();
  format!("fallback:{}|{}|{}|{}", offer.title, offer.merchant, price, index)
}

/// Decode the `url` parameter of a wrapped redirect (e.g. `/api/out?url=...`).
/// Returns None unless the wrapped target is an absolute http(s) URL.
pub fn unwrap_clickout(raw: &str) -> Option<String> {
  let raw = raw.trim();
  if raw.is_empty() || raw.to_ascii_lowercase().starts_with("mailto:") {
    return None;
  }

  let parsed = match Url::parse(raw) {
    Ok(parsed) => parsed,
    Err(url::ParseError::RelativeUrlWithoutBase) => {
      Url::parse("https://clickout.invalid").ok()?.join(raw).ok()?
    }
    Err(_) => return None,
  };

  let target = parsed.query_pairs().find(|(name, _)| name == "url").map(|(_, value)| value)?;
  let target = target.trim();
  if is_http_url(target) {
    Some(target.to_string())
  } else {
    None
  }
}

fn is_http_url(candidate: &str) -> bool {
  let lowered = candidate.to_ascii_lowercase();
  lowered.starts_with("http://") || lowered.starts_with("https://")
}

fn is_direct_url(candidate: &str) -> bool {
  let candidate = candidate.trim();
  is_http_url(candidate) || candidate.to_ascii_lowercase().starts_with("mailto:")
}

/// Predicate matching the offer whose key equals `key`
pub fn key_matcher(key: &str) -> impl Fn(&Offer, usize) -> bool + '_ {
  move |offer, index| derive_offer_key(offer, index) == key
}

/// Predicate matching a persisted bid, independent of list position
pub fn bid_matcher(bid_id: BidId) -> impl Fn(&Offer, usize) -> bool {
  move |offer, _| offer.bid_id == Some(bid_id)
}

/// Drop later duplicates, keeping the first occurrence of each key
pub fn dedupe_offers(offers: Vec<Offer>) -> Vec<Offer> {
  let mut seen = std::collections::HashSet::new();
  offers
    .into_iter()
    .enumerate()
    .filter(|(index, offer)| seen.insert(derive_offer_key(offer, *index)))
    .map(|(_, offer)| offer)
    .collect()
}

/// Deserialize a list of raw hits, normalizing each one. `null` yields an empty list.
pub fn deserialize_offers<'de, D>(deserializer: D) -> Result<Vec<Offer>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
  Ok(raw.unwrap_or_default().iter().map(Offer::from_raw).collect())
}

/// Partial update applied by targeted store mutations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferPatch {
  pub is_selected: Option<bool>,
  pub is_liked: Option<bool>,
  pub liked_at: Option<Option<DateTime<Utc>>>,
  pub comment_preview: Option<Option<String>>,
  pub match_score: Option<Option<f64>>,
}

impl OfferPatch {
  pub fn selected(is_selected: bool) -> Self {
    Self { is_selected: Some(is_selected), ..Self::default() }
  }

  pub fn liked(is_liked: bool, liked_at: Option<DateTime<Utc>>) -> Self {
    Self { is_liked: Some(is_liked), liked_at: Some(liked_at), ..Self::default() }
  }

  pub fn comment_preview(preview: Option<String>) -> Self {
    Self { comment_preview: Some(preview), ..Self::default() }
  }

  pub fn apply(&self, offer: &mut Offer) {
    if let Some(is_selected) = self.is_selected {
      offer.is_selected = is_selected;
    }
    if let Some(is_liked) = self.is_liked {
      offer.is_liked = is_liked;
    }
    if let Some(liked_at) = self.liked_at {
      offer.liked_at = liked_at;
    }
    if let Some(preview) = &self.comment_preview {
      offer.comment_preview = preview.clone();
    }
    if let Some(score) = self.match_score {
      offer.match_score = score;
    }
  }
}

fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
  keys.iter().filter_map(|key| raw.get(key)).find(|value| !value.is_null())
}

fn str_field(raw: &Value, keys: &[&str]) -> Option<String> {
  match lookup(raw, keys)? {
    Value::String(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
    Value::Number(value) => Some(value.to_string()),
    _ => None,
  }
}

fn f64_field(raw: &Value, keys: &[&str]) -> Option<f64> {
  let parsed = match lookup(raw, keys)? {
    Value::Number(value) => value.as_f64(),
    Value::String(value) => {
      let cleaned: String =
        value.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
      cleaned.parse().ok()
    }
    _ => None,
  };
  parsed.filter(|value| value.is_finite())
}

fn i64_field(raw: &Value, keys: &[&str]) -> Option<i64> {
  match lookup(raw, keys)? {
    Value::Number(value) => value.as_i64(),
    Value::String(value) => value.trim().parse().ok(),
    _ => None,
  }
}

fn bool_field(raw: &Value, keys: &[&str]) -> bool {
  matches!(lookup(raw, keys), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn relative_clickout_is_unwrapped() {
    let wrapped = "/api/out?url=https%3A%2F%2Fshop.example.com%2Fitem%3Fid%3D7&row_id=3";
    assert_eq!(unwrap_clickout(wrapped).as_deref(), Some("https://shop.example.com/item?id=7"));
  }

  #[test]
  fn non_http_targets_are_not_unwrapped() {
    assert_eq!(unwrap_clickout("/api/out?url=javascript%3Aalert(1)"), None);
    assert_eq!(unwrap_clickout("mailto:sales@example.com?url=https://x.test"), None);
    assert_eq!(unwrap_clickout("https://shop.example.com/item"), None);
  }

  #[test]
  fn price_strings_are_cleaned() {
    let offer = Offer::from_raw(&json!({ "title": "Hoodie", "price": "$1,249.50" }));
    assert_eq!(offer.price, Some(1249.5));
  }

  #[test]
  fn match_score_is_clamped() {
    let offer = Offer::from_raw(&json!({ "title": "Hoodie", "match_score": 3.2 }));
    assert_eq!(offer.match_score, Some(1.0));
  }
}
