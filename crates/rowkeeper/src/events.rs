//! Structured chat-stream events
//!
//! The chat endpoint streams SSE frames whose event name selects the payload
//! shape. Frames are decoded into `ChatEvent` here; event names this client
//! doesn't know are skipped rather than treated as errors.

use serde::Deserialize;
use serde_json::Value;

use crate::offer::{deserialize_offers, Offer, ProviderStatusSnapshot};
use crate::row::{Row, RowId};

/// What the agent started doing, from `action_started`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionStarted {
  Search {
    #[serde(default)]
    row_id: Option<RowId>,
    #[serde(default)]
    query: String,
  },
  CreateRow {
    #[serde(default)]
    title: String,
  },
  UpdateRow {
    row_id: RowId,
  },
  FetchVendors {
    row_id: RowId,
    #[serde(default)]
    category: Option<String>,
  },
  VendorOutreach,
  #[serde(other)]
  Other,
}

/// One batch of provider results for a row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchBatch {
  pub row_id: RowId,
  #[serde(default, deserialize_with = "deserialize_offers")]
  pub results: Vec<Offer>,
  #[serde(default)]
  pub provider_statuses: Vec<ProviderStatusSnapshot>,
  #[serde(default)]
  pub more_incoming: bool,
  #[serde(default)]
  pub user_message: Option<String>,
  #[serde(default)]
  pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
  ActionStarted(ActionStarted),
  RowCreated { row: Row },
  RowUpdated { row: Row },
  FactorsUpdated { row: Row },
  SearchResults(SearchBatch),
  VendorsLoaded { row_id: RowId, category: Option<String>, vendors: Vec<Offer> },
  AssistantMessage { text: String },
  NeedsClarification(Clarification),
  Disambiguate(Disambiguation),
  VendorOutreach(VendorOutreach),
  Error { message: String },
  Done,
}

/// The agent needs more detail before it can create or search a row
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Clarification {
  #[serde(default)]
  pub text: Option<String>,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default)]
  pub service_type: Option<String>,
  #[serde(default)]
  pub missing_fields: Vec<String>,
}

impl Clarification {
  /// Question to show the user. Explicit text wins; otherwise it is built
  /// from the title and the missing fields.
  pub fn prompt(&self) -> String {
    if let Some(text) = self.text.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
      return text.to_string();
    }

    let fields: Vec<String> = self.missing_fields.iter().map(|field| field.replace('_', " ")).collect();
    let subject = self.title.as_deref().map(str::trim).filter(|title| !title.is_empty());
    match (subject, fields.is_empty()) {
      (Some(title), false) => format!("To find {title}, tell me the {}.", fields.join(", ")),
      (None, false) => format!("Tell me the {} so I can search.", fields.join(", ")),
      (Some(title), true) => format!("Can you tell me more about the {title} you need?"),
      (None, true) => "Can you tell me more about what you need?".to_string(),
    }
  }
}

/// The message matched several things; the user picks one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disambiguation {
  pub title: Option<String>,
  pub options: Vec<String>,
}

/// The agent started contacting vendors for a service row
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VendorOutreach {
  pub row_id: RowId,
  #[serde(default)]
  pub category: Option<String>,
}

#[derive(Deserialize)]
struct RowPayload {
  row: Row,
}

#[derive(Deserialize)]
struct DisambiguatePayload {
  #[serde(default)]
  title: Option<String>,
  #[serde(default)]
  options: Vec<Value>,
}

#[derive(Deserialize)]
struct VendorsPayload {
  row_id: RowId,
  #[serde(default)]
  category: Option<String>,
  #[serde(default)]
  vendors: Vec<Value>,
}

impl ChatEvent {
  /// Decode one SSE frame. Unknown event names yield `Ok(None)`.
  pub fn from_frame(name: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
    let event = match name {
      "action_started" => Self::ActionStarted(serde_json::from_str(data)?),
      // A context switch creates the row for the new topic
      "row_created" | "context_switch" => {
        Self::RowCreated { row: serde_json::from_str::<RowPayload>(data)?.row }
      }
      "row_updated" => Self::RowUpdated { row: serde_json::from_str::<RowPayload>(data)?.row },
      "factors_updated" => Self::FactorsUpdated { row: serde_json::from_str::<RowPayload>(data)?.row },
      "search_results" => Self::SearchResults(serde_json::from_str(data)?),
      "vendors_loaded" => {
        let payload: VendorsPayload = serde_json::from_str(data)?;
        Self::VendorsLoaded {
          row_id: payload.row_id,
          category: payload.category,
          vendors: payload.vendors.iter().map(vendor_offer).collect(),
        }
      }
      "assistant_message" => {
        let value: Value = serde_json::from_str(data)?;
        Self::AssistantMessage { text: text_field(&value).unwrap_or_default() }
      }
      "needs_clarification" => {
        let value: Value = serde_json::from_str(data)?;
        let clarification = match &value {
          Value::String(text) => Clarification { text: Some(text.clone()), ..Clarification::default() },
          _ => {
            let mut clarification = Clarification::deserialize(&value)?;
            if clarification.text.is_none() {
              clarification.text = text_field(&value);
            }
            clarification
          }
        };
        Self::NeedsClarification(clarification)
      }
      "disambiguate" => {
        let payload: DisambiguatePayload = serde_json::from_str(data)?;
        Self::Disambiguate(Disambiguation {
          title: payload.title,
          options: payload.options.iter().filter_map(option_label).collect(),
        })
      }
      "vendor_outreach" => Self::VendorOutreach(serde_json::from_str(data)?),
      "error" => {
        let value: Value = serde_json::from_str(data)?;
        let message = value
          .get("message")
          .and_then(Value::as_str)
          .unwrap_or("Something went wrong")
          .to_string();
        Self::Error { message }
      }
      "done" => Self::Done,
      other => {
        tracing::debug!(event = other, "skipping unknown chat event");
        return Ok(None);
      }
    };
    Ok(Some(event))
  }
}

/// Vendors are directory entries, never persisted bids
fn vendor_offer(raw: &Value) -> Offer {
  Offer { bid_id: None, is_service_provider: true, ..Offer::from_raw(raw) }
}

fn text_field(value: &Value) -> Option<String> {
  ["text", "message", "content"]
    .iter()
    .find_map(|key| value.get(key).and_then(Value::as_str))
    .or_else(|| value.as_str())
    .map(str::to_string)
}

/// Options arrive as plain strings or as objects with a label
fn option_label(option: &Value) -> Option<String> {
  match option {
    Value::String(label) => Some(label.clone()),
    Value::Object(fields) => ["label", "title", "name"]
      .iter()
      .find_map(|key| fields.get(*key).and_then(Value::as_str))
      .map(str::to_string),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn search_action_decodes_optional_row() {
    let event = ChatEvent::from_frame("action_started", r#"{"type":"search","query":"hoodie"}"#)
      .unwrap()
      .unwrap();
    assert_eq!(
      event,
      ChatEvent::ActionStarted(ActionStarted::Search { row_id: None, query: "hoodie".into() })
    );
  }

  #[test]
  fn unknown_action_type_is_other() {
    let event =
      ChatEvent::from_frame("action_started", r#"{"type":"send_email"}"#).unwrap().unwrap();
    assert_eq!(event, ChatEvent::ActionStarted(ActionStarted::Other));
  }

  #[test]
  fn unknown_event_name_is_skipped() {
    assert_eq!(ChatEvent::from_frame("heartbeat", "{}").unwrap(), None);
  }

  #[test]
  fn vendors_become_service_provider_offers() {
    let data = r#"{"row_id":4,"category":"caterers","vendors":[{"id":99,"name":"Bay Catering","website":"https://bay.example"}]}"#;
    let Some(ChatEvent::VendorsLoaded { vendors, .. }) = ChatEvent::from_frame("vendors_loaded", data).unwrap() else {
      panic!("expected vendors_loaded");
    };
    assert_eq!(vendors.len(), 1);
    assert_eq!(vendors[0].bid_id, None);
    assert!(vendors[0].is_service_provider);
    assert_eq!(vendors[0].title, "Bay Catering");
  }

  #[test]
  fn clarification_payload_builds_prompt() {
    let data = r#"{"type":"clarification","service_type":null,"title":"Running shoes","partial_constraints":{"budget":"100"},"missing_fields":["size","color"]}"#;
    let Some(ChatEvent::NeedsClarification(clarification)) =
      ChatEvent::from_frame("needs_clarification", data).unwrap()
    else {
      panic!("expected needs_clarification");
    };
    assert_eq!(clarification.title.as_deref(), Some("Running shoes"));
    assert_eq!(clarification.missing_fields, vec!["size", "color"]);
    assert_eq!(clarification.prompt(), "To find Running shoes, tell me the size, color.");
  }

  #[test]
  fn clarification_text_wins_over_fields() {
    let data = r#"{"text":"Which city?","missing_fields":["location"]}"#;
    let Some(ChatEvent::NeedsClarification(clarification)) =
      ChatEvent::from_frame("needs_clarification", data).unwrap()
    else {
      panic!("expected needs_clarification");
    };
    assert_eq!(clarification.prompt(), "Which city?");
    assert_eq!(Clarification::default().prompt(), "Can you tell me more about what you need?");
  }

  #[test]
  fn disambiguate_collects_option_labels() {
    let data = r#"{"title":"Apple","options":["Apple laptop",{"label":"Apple fruit box"},42]}"#;
    let event = ChatEvent::from_frame("disambiguate", data).unwrap();
    assert_eq!(
      event,
      Some(ChatEvent::Disambiguate(Disambiguation {
        title: Some("Apple".into()),
        options: vec!["Apple laptop".into(), "Apple fruit box".into()],
      }))
    );
  }

  #[test]
  fn vendor_outreach_and_context_switch_decode() {
    let outreach = ChatEvent::from_frame("vendor_outreach", r#"{"row_id":3,"category":"caterers"}"#).unwrap();
    assert_eq!(
      outreach,
      Some(ChatEvent::VendorOutreach(VendorOutreach { row_id: 3, category: Some("caterers".into()) }))
    );

    let switched = ChatEvent::from_frame("context_switch", r#"{"row":{"id":8,"title":"Tent"}}"#).unwrap();
    assert!(matches!(switched, Some(ChatEvent::RowCreated { row }) if row.id == 8));
  }
}
