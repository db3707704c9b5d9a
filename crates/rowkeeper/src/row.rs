//! Row model - one purchase intent
//!
//! Choice factors and answers are persisted by the backend either as JSON or
//! as JSON serialized into a text column. Both are parsed defensively: anything
//! malformed becomes an empty collection instead of an error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type RowId = i64;

/// Factor name to user-supplied value
pub type ChoiceAnswers = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
  #[default]
  New,
  Sourcing,
  BidsArriving,
  Closed,
  Archived,
}

impl RowStatus {
  pub fn parse(value: &str) -> Option<Self> {
    match value.trim().to_ascii_lowercase().as_str() {
      "new" => Some(Self::New),
      "sourcing" => Some(Self::Sourcing),
      "bids_arriving" => Some(Self::BidsArriving),
      "closed" => Some(Self::Closed),
      "archived" => Some(Self::Archived),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::New => "new",
      Self::Sourcing => "sourcing",
      Self::BidsArriving => "bids_arriving",
      Self::Closed => "closed",
      Self::Archived => "archived",
    }
  }
}

// Unknown statuses from newer backends read as `new`
impl<'de> Deserialize<'de> for RowStatus {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(RowStatus::parse).unwrap_or_default())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
  #[default]
  Text,
  Number,
  Select,
  #[serde(alias = "bool")]
  Boolean,
}

/// Structured question generated for a row to refine matching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceFactor {
  pub name: String,
  #[serde(default)]
  pub label: String,
  #[serde(rename = "type", default)]
  pub kind: FactorType,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(default)]
  pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
  pub id: RowId,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub status: RowStatus,
  #[serde(default, deserialize_with = "lenient_factors")]
  pub choice_factors: Vec<ChoiceFactor>,
  #[serde(default, deserialize_with = "lenient_answers")]
  pub choice_answers: ChoiceAnswers,
  #[serde(default)]
  pub service_category: Option<String>,
  #[serde(default)]
  pub is_service: bool,
}

impl Row {
  pub fn new(id: RowId, title: impl Into<String>) -> Self {
    Self {
      id,
      title: title.into(),
      status: RowStatus::New,
      choice_factors: Vec::new(),
      choice_answers: ChoiceAnswers::new(),
      service_category: None,
      is_service: false,
    }
  }
}

/// Partial row update applied by `Store::update_row`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPatch {
  pub title: Option<String>,
  pub status: Option<RowStatus>,
  pub choice_factors: Option<Vec<ChoiceFactor>>,
  pub choice_answers: Option<ChoiceAnswers>,
  pub service_category: Option<Option<String>>,
  pub is_service: Option<bool>,
}

impl RowPatch {
  pub fn status(status: RowStatus) -> Self {
    Self { status: Some(status), ..Self::default() }
  }

  pub fn title(title: impl Into<String>) -> Self {
    Self { title: Some(title.into()), ..Self::default() }
  }

  pub fn answers(answers: ChoiceAnswers) -> Self {
    Self { choice_answers: Some(answers), ..Self::default() }
  }

  /// Every server-owned field of `row`
  pub fn from_row(row: &Row) -> Self {
    Self {
      title: Some(row.title.clone()),
      status: Some(row.status),
      choice_factors: Some(row.choice_factors.clone()),
      choice_answers: Some(row.choice_answers.clone()),
      service_category: Some(row.service_category.clone()),
      is_service: Some(row.is_service),
    }
  }

  pub fn apply(&self, row: &mut Row) {
    if let Some(title) = &self.title {
      row.title = title.clone();
    }
    if let Some(status) = self.status {
      row.status = status;
    }
    if let Some(factors) = &self.choice_factors {
      row.choice_factors = factors.clone();
    }
    if let Some(answers) = &self.choice_answers {
      row.choice_answers = answers.clone();
    }
    if let Some(category) = &self.service_category {
      row.service_category = category.clone();
    }
    if let Some(is_service) = self.is_service {
      row.is_service = is_service;
    }
  }
}

/// Parse persisted choice factors. Accepts an array or a string holding one;
/// malformed entries are skipped.
pub fn parse_choice_factors(value: &Value) -> Vec<ChoiceFactor> {
  let parsed;
  let value = match value {
    Value::String(text) => match serde_json::from_str::<Value>(text) {
      Ok(inner) => {
        parsed = inner;
        &parsed
      }
      Err(err) => {
        tracing::debug!(error = %err, "choice factors are not valid JSON");
        return Vec::new();
      }
    },
    other => other,
  };

  match value {
    Value::Array(items) => items
      .iter()
      .filter_map(|item| serde_json::from_value::<ChoiceFactor>(item.clone()).ok())
      .collect(),
    _ => Vec::new(),
  }
}

/// Parse persisted choice answers. Non-object JSON yields an empty map.
pub fn parse_choice_answers(value: &Value) -> ChoiceAnswers {
  match value {
    Value::Object(map) => map.clone(),
    Value::String(text) => parse_choice_answers_text(text),
    _ => ChoiceAnswers::new(),
  }
}

pub fn parse_choice_answers_text(text: &str) -> ChoiceAnswers {
  match serde_json::from_str::<Value>(text) {
    Ok(Value::Object(map)) => map,
    Ok(_) => ChoiceAnswers::new(),
    Err(err) => {
      tracing::debug!(error = %err, "choice answers are not valid JSON");
      ChoiceAnswers::new()
    }
  }
}

fn lenient_factors<'de, D>(deserializer: D) -> Result<Vec<ChoiceFactor>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Value::deserialize(deserializer)?;
  Ok(parse_choice_factors(&raw))
}

fn lenient_answers<'de, D>(deserializer: D) -> Result<ChoiceAnswers, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Value::deserialize(deserializer)?;
  Ok(parse_choice_answers(&raw))
}
