//! Intent router
//!
//! Decides whether an incoming chat message should open a new row instead of
//! refining the active one. This is a best-effort lexical classifier: messages
//! that look like price or budget tweaks always refine, and otherwise the
//! message has to share enough vocabulary with the active row's title.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static REFINEMENT_SIGNAL: Lazy<Option<Regex>> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(?:over|under|cheaper|more|less|budget|price)\b|[$€£]\s*\d|\b\d+(?:\.\d+)?\s*(?:dollars|bucks|usd|eur|gbp)\b",
  )
  .ok()
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRouterConfig {
  /// Aggressiveness used when the caller doesn't supply one (0-100)
  #[serde(default = "default_aggressiveness")]
  pub aggressiveness: i32,

  /// Below this aggressiveness the router never forces a new row
  #[serde(default = "default_min_aggressiveness")]
  pub min_aggressiveness: i32,

  #[serde(default = "default_min_threshold")]
  pub min_threshold: f64,

  #[serde(default = "default_max_threshold")]
  pub max_threshold: f64,
}

fn default_aggressiveness() -> i32 {
  50
}

fn default_min_aggressiveness() -> i32 {
  60
}

fn default_min_threshold() -> f64 {
  0.1
}

fn default_max_threshold() -> f64 {
  0.5
}

impl Default for IntentRouterConfig {
  fn default() -> Self {
    Self {
      aggressiveness: default_aggressiveness(),
      min_aggressiveness: default_min_aggressiveness(),
      min_threshold: default_min_threshold(),
      max_threshold: default_max_threshold(),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct RouteInput<'a> {
  pub message: &'a str,
  pub active_row_title: Option<&'a str>,
  pub aggressiveness: i32,
}

pub fn should_force_new_row(input: &RouteInput<'_>, config: &IntentRouterConfig) -> bool {
  let Some(title) = input.active_row_title.map(str::trim).filter(|title| !title.is_empty()) else {
    return false;
  };
  let message = input.message.trim();
  if message.is_empty() {
    return false;
  }

  let aggressiveness = input.aggressiveness.clamp(0, 100);
  if aggressiveness < config.min_aggressiveness {
    return false;
  }

  if is_refinement(message) {
    return false;
  }

  lexical_similarity(title, message) < similarity_threshold(aggressiveness, config)
}

/// Price/budget adjustments always refine the current row
pub fn is_refinement(message: &str) -> bool {
  REFINEMENT_SIGNAL.as_ref().is_some_and(|pattern| pattern.is_match(message))
}

/// Shared-word ratio relative to the shorter of the two word sets
pub fn lexical_similarity(a: &str, b: &str) -> f64 {
  let left = significant_words(a);
  let right = significant_words(b);
  let shared = left.intersection(&right).count();
  let denominator = left.len().min(right.len()).max(1);
  shared as f64 / denominator as f64
}

/// Linear map of [min_aggressiveness, 100] onto [min_threshold, max_threshold]
pub fn similarity_threshold(aggressiveness: i32, config: &IntentRouterConfig) -> f64 {
  let floor = config.min_aggressiveness.clamp(0, 100);
  let span = (100 - floor) as f64;
  if span <= 0.0 {
    return config.max_threshold;
  }
  let position = ((aggressiveness.clamp(0, 100) - floor) as f64 / span).clamp(0.0, 1.0);
  config.min_threshold + position * (config.max_threshold - config.min_threshold)
}

fn significant_words(text: &str) -> HashSet<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|word| word.chars().count() > 2)
    .map(str::to_lowercase)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn currency_amounts_are_refinements() {
    assert!(is_refinement("under $50"));
    assert!(is_refinement("something around 40 bucks"));
    assert!(is_refinement("€ 30 max"));
    assert!(!is_refinement("I need running shoes"));
  }

  #[test]
  fn threshold_spans_configured_range() {
    let config = IntentRouterConfig::default();
    assert!((similarity_threshold(60, &config) - 0.1).abs() < 1e-9);
    assert!((similarity_threshold(100, &config) - 0.5).abs() < 1e-9);
    assert!((similarity_threshold(80, &config) - 0.3).abs() < 1e-9);
  }

  #[test]
  fn similarity_ignores_short_words() {
    assert_eq!(lexical_similarity("a blue hoodie", "blue hoodie in XL"), 1.0);
    assert_eq!(lexical_similarity("it", "of"), 0.0);
  }
}
