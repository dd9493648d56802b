use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{error::PersistenceError, stage::StageId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(String);

impl DealId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh random id for a newly created deal.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DealId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for DealId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A deal card on the pipeline board.
///
/// Only `stage` and `probability` are ever changed by the board. `title` and
/// `contact` are read by the search filter; `attributes` is carried through
/// untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub stage: StageId,
    pub probability: u8,
    /// Amount in minor currency units.
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Deal {
    pub fn new(
        id: impl Into<DealId>,
        title: impl Into<String>,
        stage: impl Into<StageId>,
        probability: u8,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            contact: None,
            stage: stage.into(),
            probability,
            value: None,
            attributes: Map::new(),
        }
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn value_or_zero(&self) -> i64 {
        self.value.unwrap_or(0)
    }

    /// Value weighted by probability, rounded down.
    pub fn expected_value(&self) -> i64 {
        let weighted = i128::from(self.value_or_zero()) * i128::from(self.probability) / 100;
        weighted as i64
    }

    /// `needle` must already be lowercased.
    pub(crate) fn matches_search(&self, needle: &str) -> bool {
        if self.title.to_lowercase().contains(needle) {
            return true;
        }
        self.contact
            .as_deref()
            .map(|contact| contact.to_lowercase().contains(needle))
            .unwrap_or(false)
    }

    pub fn apply_patch(&mut self, patch: &StagePatch) {
        self.stage = patch.stage.clone();
        self.probability = patch.probability;
    }
}

/// Input for `DealStore::create`; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewDeal {
    pub title: String,
    #[serde(default)]
    pub contact: Option<String>,
    pub stage: StageId,
    pub probability: u8,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl NewDeal {
    pub fn new(title: impl Into<String>, stage: impl Into<StageId>, probability: u8) -> Self {
        Self {
            title: title.into(),
            contact: None,
            stage: stage.into(),
            probability,
            value: None,
            attributes: Map::new(),
        }
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.title.trim().is_empty() {
            return Err(PersistenceError::Validation("title cannot be blank".into()));
        }
        if self.stage.as_str().trim().is_empty() {
            return Err(PersistenceError::Validation("stage cannot be blank".into()));
        }
        validate_probability(self.probability)?;
        if let Some(value) = self.value.filter(|value| *value < 0) {
            return Err(PersistenceError::Validation(format!(
                "value must be non-negative, got {value}"
            )));
        }
        Ok(())
    }

    pub fn into_deal(self, id: DealId) -> Deal {
        Deal {
            id,
            title: self.title,
            contact: self.contact,
            stage: self.stage,
            probability: self.probability,
            value: self.value,
            attributes: self.attributes,
        }
    }
}

/// The only write the board issues: stage and probability together.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePatch {
    pub stage: StageId,
    pub probability: u8,
}

impl StagePatch {
    pub fn validate(&self) -> Result<(), PersistenceError> {
        if self.stage.as_str().trim().is_empty() {
            return Err(PersistenceError::Validation("stage cannot be blank".into()));
        }
        validate_probability(self.probability)
    }
}

fn validate_probability(probability: u8) -> Result<(), PersistenceError> {
    if probability > 100 {
        return Err(PersistenceError::Validation(format!(
            "probability must be between 0 and 100, got {probability}"
        )));
    }
    Ok(())
}
