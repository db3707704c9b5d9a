//! Terminal rendering for rows and offers

use colored::{ColoredString, Colorize};

use crate::offer::{derive_offer_key, Offer, ProviderStatus, ProviderStatusSnapshot};
use crate::row::{Row, RowStatus};
use crate::store::RowResults;

pub const MORE_INCOMING_PLACEHOLDER: &str = "Fetching more offers...";

pub fn format_price(price: Option<f64>, currency: &str) -> String {
  match price {
    Some(price) if currency.eq_ignore_ascii_case("USD") => format!("${price:.2}"),
    Some(price) => format!("{price:.2} {}", currency.to_uppercase()),
    None => "price on request".to_string(),
  }
}

pub fn status_label(status: RowStatus) -> ColoredString {
  match status {
    RowStatus::New => status.as_str().normal(),
    RowStatus::Sourcing => status.as_str().cyan(),
    RowStatus::BidsArriving => status.as_str().yellow(),
    RowStatus::Closed => status.as_str().green(),
    RowStatus::Archived => status.as_str().dimmed(),
  }
}

pub fn row_line(row: &Row) -> String {
  format!("#{} {} [{}]", row.id, row.title.bold(), status_label(row.status))
}

/// One offer as a single line, prefixed with the key used to act on it
pub fn offer_line(offer: &Offer, index: usize) -> String {
  let mut flags = Vec::new();
  if offer.is_selected {
    flags.push("selected".green().to_string());
  }
  if offer.is_liked {
    flags.push("liked".magenta().to_string());
  }
  if offer.is_service_provider {
    flags.push("vendor".blue().to_string());
  }

  let merchant = if offer.merchant.is_empty() { offer.source.as_str() } else { offer.merchant.as_str() };
  let mut line = format!(
    "{:>2}. {} - {} ({})",
    index + 1,
    offer.title,
    format_price(offer.price, &offer.currency),
    merchant
  );
  if !flags.is_empty() {
    line.push_str(&format!(" [{}]", flags.join(", ")));
  }
  line.push_str(&format!("\n    key: {}", derive_offer_key(offer, index).dimmed()));
  if let Some(preview) = &offer.comment_preview {
    line.push_str(&format!("\n    note: {}", preview.italic()));
  }
  line
}

pub fn provider_status_line(statuses: &[ProviderStatusSnapshot]) -> Option<String> {
  if statuses.is_empty() {
    return None;
  }

  let parts: Vec<String> = statuses
    .iter()
    .map(|snapshot| {
      let label = format!("{} {}", snapshot.provider_id, snapshot.result_count);
      match snapshot.status {
        ProviderStatus::Ok => label.green().to_string(),
        ProviderStatus::Timeout => format!("{label} (timeout)").yellow().to_string(),
        ProviderStatus::RateLimited => format!("{label} (rate limited)").yellow().to_string(),
        ProviderStatus::Exhausted => format!("{label} (quota)").red().to_string(),
        ProviderStatus::Error => format!("{label} (error)").red().to_string(),
      }
    })
    .collect();
  Some(format!("Providers: {}", parts.join(" | ")))
}

pub fn render_row(row: &Row, results: &RowResults) -> Vec<String> {
  let mut lines = vec![row_line(row)];

  for (index, offer) in results.offers.iter().enumerate() {
    lines.push(offer_line(offer, index));
  }
  if results.offers.is_empty() && !results.more_incoming {
    lines.push("    no offers yet".dimmed().to_string());
  }
  if results.more_incoming {
    lines.push(format!("    {}", MORE_INCOMING_PLACEHOLDER.dimmed()));
  }
  if let Some(line) = provider_status_line(&results.provider_statuses) {
    lines.push(line);
  }
  if let Some(error) = &results.search_error {
    lines.push(error.red().to_string());
  }
  lines
}
